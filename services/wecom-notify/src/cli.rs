//! Command-line parsing
//!
//! `wecom-notify [--config PATH] [--safe] <command> <args..>`

use std::path::PathBuf;

use anyhow::{Result, bail};
use wecom_message::MediaType;

pub const USAGE: &str = "\
usage: wecom-notify [--config PATH] [--safe] <command> <args..>

commands:
  text <content>
  markdown <content>
  textcard <title> <description> <url>
  news <title> <description> <url> [picurl]
  image <path>                     upload, then send as image
  file <path>                      upload, then send as file
  upload <image|voice|video|file> <path>   print the media_id";

/// What to send.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Text(String),
    Markdown(String),
    TextCard {
        title: String,
        description: String,
        url: String,
    },
    News {
        title: String,
        description: String,
        url: String,
        picurl: Option<String>,
    },
    Image(PathBuf),
    File(PathBuf),
    Upload {
        media_type: MediaType,
        path: PathBuf,
    },
}

/// Parsed invocation.
#[derive(Debug, PartialEq, Eq)]
pub struct Cli {
    pub config_path: Option<String>,
    pub safe: bool,
    pub command: Command,
}

/// Parse arguments (without the program name).
pub fn parse(args: &[String]) -> Result<Cli> {
    let mut config_path = None;
    let mut safe = false;
    let mut positional = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => match iter.next() {
                Some(p) => config_path = Some(p.clone()),
                None => bail!("--config requires a path\n\n{USAGE}"),
            },
            "--safe" => safe = true,
            _ => positional.push(arg.as_str()),
        }
    }

    let Some((&name, rest)) = positional.split_first() else {
        bail!("missing command\n\n{USAGE}");
    };

    let command = match (name, rest) {
        ("text", [content]) => Command::Text(content.to_string()),
        ("markdown", [content]) => Command::Markdown(content.to_string()),
        ("textcard", [title, description, url]) => Command::TextCard {
            title: title.to_string(),
            description: description.to_string(),
            url: url.to_string(),
        },
        ("news", [title, description, url, picurl @ ..]) if picurl.len() <= 1 => Command::News {
            title: title.to_string(),
            description: description.to_string(),
            url: url.to_string(),
            picurl: picurl.first().map(|p| p.to_string()),
        },
        ("image", [path]) => Command::Image(PathBuf::from(path)),
        ("file", [path]) => Command::File(PathBuf::from(path)),
        ("upload", [kind, path]) => Command::Upload {
            media_type: kind.parse()?,
            path: PathBuf::from(path),
        },
        _ => bail!("invalid command or arguments: {}\n\n{USAGE}", positional.join(" ")),
    };

    Ok(Cli {
        config_path,
        safe,
        command,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_text_with_flags_in_any_position() {
        let cli = parse(&args(&["text", "--safe", "hello", "--config", "/etc/w.toml"])).unwrap();
        assert_eq!(cli.command, Command::Text("hello".into()));
        assert!(cli.safe);
        assert_eq!(cli.config_path.as_deref(), Some("/etc/w.toml"));
    }

    #[test]
    fn parses_textcard() {
        let cli = parse(&args(&["textcard", "t", "d", "https://x"])).unwrap();
        assert_eq!(
            cli.command,
            Command::TextCard {
                title: "t".into(),
                description: "d".into(),
                url: "https://x".into(),
            }
        );
        assert!(!cli.safe);
    }

    #[test]
    fn news_picurl_is_optional() {
        let without = parse(&args(&["news", "t", "d", "u"])).unwrap();
        assert!(matches!(without.command, Command::News { picurl: None, .. }));

        let with = parse(&args(&["news", "t", "d", "u", "p"])).unwrap();
        assert!(matches!(with.command, Command::News { picurl: Some(ref p), .. } if p == "p"));

        assert!(parse(&args(&["news", "t", "d", "u", "p", "extra"])).is_err());
    }

    #[test]
    fn parses_upload_media_type() {
        let cli = parse(&args(&["upload", "voice", "/tmp/a.amr"])).unwrap();
        assert_eq!(
            cli.command,
            Command::Upload {
                media_type: MediaType::Voice,
                path: PathBuf::from("/tmp/a.amr"),
            }
        );
        assert!(parse(&args(&["upload", "gif", "/tmp/a.gif"])).is_err());
    }

    #[test]
    fn rejects_missing_or_unknown_command() {
        assert!(parse(&args(&[])).is_err());
        assert!(parse(&args(&["--safe"])).is_err());
        assert!(parse(&args(&["voice", "x"])).is_err());
        assert!(parse(&args(&["text"])).is_err());
        assert!(parse(&args(&["--config"])).is_err());
    }
}
