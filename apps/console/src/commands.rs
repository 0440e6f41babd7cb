use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use sprout_domain::BucketKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Grid,
    Tap(usize),
    Record {
        bucket: BucketKind,
        name: Option<String>,
    },
    Stop,
    Add {
        bucket: BucketKind,
        path: PathBuf,
        name: Option<String>,
    },
    List,
    Delete {
        bucket: BucketKind,
        index: usize,
    },
    Play,
    Mode(BucketKind),
    Admin,
    Lock,
    Import(PathBuf),
    Export(Option<PathBuf>),
    Devices,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  grid                          show the unlock grid
  tap <cell>                    press a grid cell
  record <good|bad> [name]      start recording a clip
  stop                          finish the current recording
  add <good|bad> <path> [name]  add an audio file as a clip
  list                          show both buckets
  delete <good|bad> <index>     delete a clip from the last listing
  play                          open the play screen
  mode <good|bad>               loop clips from a bucket
  admin                         stop playback and go back to the admin screen
  lock                          stop everything and relock
  import <path>                 replace all clips from an archive
  export [path]                 write all clips to an archive
  devices                       list audio devices
  quit";

impl Command {
    pub fn parse(line: &str) -> Result<Option<Command>> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let rest: Vec<&str> = words.collect();
        let joined = |from: usize| -> Option<String> {
            let text = rest.get(from..).map(|words| words.join(" "))?;
            (!text.is_empty()).then_some(text)
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "grid" => Command::Grid,
            "tap" => Command::Tap(index_arg(rest.first(), "cell")?),
            "record" => Command::Record {
                bucket: bucket_arg(rest.first())?,
                name: joined(1),
            },
            "stop" => Command::Stop,
            "add" => Command::Add {
                bucket: bucket_arg(rest.first())?,
                path: rest
                    .get(1)
                    .map(PathBuf::from)
                    .ok_or_else(|| anyhow!("add needs a file path"))?,
                name: joined(2),
            },
            "list" | "ls" => Command::List,
            "delete" | "rm" => Command::Delete {
                bucket: bucket_arg(rest.first())?,
                index: index_arg(rest.get(1), "index")?,
            },
            "play" => Command::Play,
            "mode" => Command::Mode(bucket_arg(rest.first())?),
            "admin" => Command::Admin,
            "lock" => Command::Lock,
            "import" => Command::Import(
                rest.first()
                    .map(PathBuf::from)
                    .ok_or_else(|| anyhow!("import needs a file path"))?,
            ),
            "export" => Command::Export(rest.first().map(PathBuf::from)),
            "devices" => Command::Devices,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => bail!("unknown command {other:?}, try `help`"),
        };
        Ok(Some(command))
    }
}

fn bucket_arg(word: Option<&&str>) -> Result<BucketKind> {
    let word = word.ok_or_else(|| anyhow!("expected a bucket (good or bad)"))?;
    Ok(word.parse()?)
}

fn index_arg(word: Option<&&str>, what: &str) -> Result<usize> {
    let word = word.ok_or_else(|| anyhow!("expected a {what}"))?;
    word.parse()
        .with_context(|| format!("{what} must be a number, got {word:?}"))
}
