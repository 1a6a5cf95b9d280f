// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 电机命令词表 (Actuator command vocabulary)
//!
//! 每条命令对应一行文本/一个UDP数据报:
//! `STOP` `FORWARD` `BACKWARD` `LEFT` `RIGHT` 以及带速度的 `FORWARD:<n>` `LEFT:<n>` `RIGHT:<n>`。

use std::fmt;
use std::str::FromStr;

use crate::error::CommandParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Stop,
    Forward(Option<u8>),
    Backward,
    Left(Option<u8>),
    Right(Option<u8>),
}

impl Command {
    pub fn is_stop(&self) -> bool {
        matches!(self, Command::Stop)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Stop => f.write_str("STOP"),
            Command::Backward => f.write_str("BACKWARD"),
            Command::Forward(None) => f.write_str("FORWARD"),
            Command::Left(None) => f.write_str("LEFT"),
            Command::Right(None) => f.write_str("RIGHT"),
            Command::Forward(Some(speed)) => write!(f, "FORWARD:{}", speed),
            Command::Left(Some(speed)) => write!(f, "LEFT:{}", speed),
            Command::Right(Some(speed)) => write!(f, "RIGHT:{}", speed),
        }
    }
}

impl FromStr for Command {
    type Err = CommandParseError;

    /// 大小写不敏感; 速度参数必须是整数, 超出 0-255 的值饱和到线路范围,
    /// 再由分发器钳制到配置上下限
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CommandParseError::Empty);
        }
        let upper = trimmed.to_ascii_uppercase();
        let (word, speed) = match upper.split_once(':') {
            Some((word, value)) => {
                let speed = value.trim().parse::<i64>().map_err(|_| {
                    CommandParseError::InvalidSpeed {
                        command: trimmed.to_string(),
                        value: value.to_string(),
                    }
                })?;
                (word.trim(), Some(speed.clamp(0, u8::MAX as i64) as u8))
            }
            None => (upper.as_str(), None),
        };

        match (word, speed) {
            ("STOP", None) => Ok(Command::Stop),
            ("BACKWARD", None) => Ok(Command::Backward),
            ("FORWARD", speed) => Ok(Command::Forward(speed)),
            ("LEFT", speed) => Ok(Command::Left(speed)),
            ("RIGHT", speed) => Ok(Command::Right(speed)),
            _ => Err(CommandParseError::Unknown(trimmed.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_vocabulary() {
        assert_eq!(Command::Stop.to_string(), "STOP");
        assert_eq!(Command::Forward(None).to_string(), "FORWARD");
        assert_eq!(Command::Forward(Some(200)).to_string(), "FORWARD:200");
        assert_eq!(Command::Left(Some(120)).to_string(), "LEFT:120");
        assert_eq!(Command::Right(None).to_string(), "RIGHT");
        assert_eq!(Command::Backward.to_string(), "BACKWARD");
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("stop".parse::<Command>(), Ok(Command::Stop));
        assert_eq!(" right:80 ".parse::<Command>(), Ok(Command::Right(Some(80))));
        assert_eq!("Forward".parse::<Command>(), Ok(Command::Forward(None)));
    }

    #[test]
    fn test_out_of_range_speed_saturates() {
        assert_eq!("LEFT:300".parse::<Command>(), Ok(Command::Left(Some(255))));
        assert_eq!("forward:-20".parse::<Command>(), Ok(Command::Forward(Some(0))));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!("".parse::<Command>(), Err(CommandParseError::Empty));
        assert!(matches!(
            "JUMP".parse::<Command>(),
            Err(CommandParseError::Unknown(_))
        ));
        assert!(matches!(
            "LEFT:fast".parse::<Command>(),
            Err(CommandParseError::InvalidSpeed { .. })
        ));
        assert!(matches!(
            "STOP:10".parse::<Command>(),
            Err(CommandParseError::Unknown(_))
        ));
    }
}
