// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 控制台命令 (stdin)
//!
//! ```text
//! mode auto|manual
//! speed forward|turn <n>
//! cmd <COMMAND>
//! status
//! snapshot
//! quit
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};

use super::{ControlHandle, Mode};
use crate::control::SpeedKind;

pub const HELP: &str =
    "commands: mode auto|manual | speed forward|turn <n> | cmd <COMMAND> | status | snapshot | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Mode(Mode),
    Speed(SpeedKind, i64),
    Cmd(String),
    Status,
    Snapshot,
    Help,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let verb = parts
            .next()
            .ok_or_else(|| anyhow!("empty line"))?
            .to_ascii_lowercase();
        let rest: Vec<&str> = parts.collect();

        match (verb.as_str(), rest.as_slice()) {
            ("mode", [mode]) => Ok(ConsoleCommand::Mode(mode.parse()?)),
            ("speed", [kind, value]) => {
                let value = value
                    .parse::<i64>()
                    .with_context(|| format!("invalid speed value {:?}", value))?;
                Ok(ConsoleCommand::Speed(kind.parse()?, value))
            }
            ("cmd", [command]) => Ok(ConsoleCommand::Cmd(command.to_string())),
            ("status", []) => Ok(ConsoleCommand::Status),
            ("snapshot", []) => Ok(ConsoleCommand::Snapshot),
            ("help", []) | ("?", []) => Ok(ConsoleCommand::Help),
            ("quit", []) | ("exit", []) => Ok(ConsoleCommand::Quit),
            _ => bail!("unrecognized input {:?}; {}", line.trim(), HELP),
        }
    }
}

impl ConsoleCommand {
    /// 执行并返回回显文本
    pub fn execute(&self, handle: &ControlHandle, snapshot_dir: &Path) -> Result<String> {
        match self {
            ConsoleCommand::Mode(mode) => {
                handle.set_mode(*mode)?;
                Ok(format!("mode = {}", mode))
            }
            ConsoleCommand::Speed(kind, value) => {
                let applied = handle.set_speed(*kind, *value);
                Ok(format!("{} speed = {}", kind, applied))
            }
            ConsoleCommand::Cmd(raw) => {
                let sent = handle.send_manual_command(raw)?;
                Ok(format!("sent {}", sent))
            }
            ConsoleCommand::Status => Ok(serde_json::to_string_pretty(&handle.status())?),
            ConsoleCommand::Snapshot => {
                let path = save_snapshot(handle, snapshot_dir)?;
                Ok(format!("saved {}", path.display()))
            }
            ConsoleCommand::Help => Ok(HELP.to_string()),
            ConsoleCommand::Quit => {
                handle.shutdown();
                Ok("bye".to_string())
            }
        }
    }
}

/// 把最新标注帧保存为 JPEG
pub fn save_snapshot(handle: &ControlHandle, dir: &Path) -> Result<PathBuf> {
    let frame = handle
        .latest_frame()
        .ok_or_else(|| anyhow!("no frame captured yet"))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("cannot create {}", dir.display()))?;
    let path = dir.join(format!("snapshot_{}.jpg", crate::gen_time_string("-")));
    frame
        .save(&path)
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(path)
}
