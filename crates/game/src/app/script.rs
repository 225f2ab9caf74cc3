use std::fs;
use std::path::{Path, PathBuf};

use overworld::{Cell, InputAction, MapId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ScriptCommand {
    /// Runs this many fixed frames with the currently held input.
    Wait { frames: u32 },
    Hold { action: InputAction },
    /// `None` releases every held direction.
    Release { action: Option<InputAction> },
    Goto { map: MapId, cell: Cell },
    GotoNamed { name: String },
    /// Story relocation: a forced switch onto an exact cell.
    Teleport { map: MapId, cell: Cell },
    Switch { map: MapId },
    Noclip { enabled: bool },
    Hide { layer: String },
    Show { layer: String },
    Save { slot: String },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScriptLine {
    pub(crate) line: usize,
    pub(crate) command: ScriptCommand,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Script {
    lines: Vec<ScriptLine>,
}

impl Script {
    pub(crate) fn lines(&self) -> &[ScriptLine] {
        &self.lines
    }

    pub(crate) fn total_wait_frames(&self) -> u64 {
        self.lines
            .iter()
            .map(|line| match line.command {
                ScriptCommand::Wait { frames } => u64::from(frames),
                _ => 0,
            })
            .sum()
    }
}

#[derive(Debug, Error)]
pub(crate) enum ScriptError {
    #[error("failed to read script '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("script line {line}: {reason}. usage: {usage}")]
    Parse {
        line: usize,
        reason: String,
        usage: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct CommandParseError {
    reason: String,
    usage: &'static str,
}

impl CommandParseError {
    fn new(reason: impl Into<String>, usage: &'static str) -> Self {
        Self {
            reason: reason.into(),
            usage,
        }
    }
}

const USAGE_WAIT: &str = "wait <frames:u32>";
const USAGE_HOLD: &str = "hold <up|down|left|right>";
const USAGE_RELEASE: &str = "release [up|down|left|right|all]";
const USAGE_GOTO: &str = "goto <map> <x:i32> <y:i32>";
const USAGE_GOTO_NAMED: &str = "goto-named <name...>";
const USAGE_TELEPORT: &str = "teleport <map> <x:i32> <y:i32>";
const USAGE_SWITCH: &str = "switch <map>";
const USAGE_NOCLIP: &str = "noclip <on|off>";
const USAGE_HIDE: &str = "hide <layer>";
const USAGE_SHOW: &str = "show <layer>";
const USAGE_SAVE: &str = "save <slot>";

pub(crate) fn load_script(path: &Path) -> Result<Script, ScriptError> {
    let raw = fs::read_to_string(path).map_err(|source| ScriptError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_script(&raw)
}

/// One command per line. Blank lines and `#` comments are skipped; names with
/// spaces are written in double quotes.
pub(crate) fn parse_script(raw: &str) -> Result<Script, ScriptError> {
    let mut lines = Vec::new();
    for (index, raw_line) in raw.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw_line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let command = parse_line(trimmed).map_err(|error| ScriptError::Parse {
            line,
            reason: error.reason,
            usage: error.usage,
        })?;
        lines.push(ScriptLine { line, command });
    }
    Ok(Script { lines })
}

fn parse_line(line: &str) -> Result<ScriptCommand, CommandParseError> {
    let tokens = tokenize_line(line)?;
    let Some((name, args)) = tokens.split_first() else {
        return Err(CommandParseError::new("empty command", USAGE_WAIT));
    };

    match name.to_ascii_lowercase().as_str() {
        "wait" => {
            let [frames] = args else {
                return Err(CommandParseError::new("expected exactly one argument <frames>", USAGE_WAIT));
            };
            let frames = frames.parse::<u32>().map_err(|_| {
                CommandParseError::new(format!("invalid frame count '{frames}' (expected u32)"), USAGE_WAIT)
            })?;
            Ok(ScriptCommand::Wait { frames })
        }
        "hold" => {
            let [token] = args else {
                return Err(CommandParseError::new("expected exactly one direction", USAGE_HOLD));
            };
            Ok(ScriptCommand::Hold {
                action: parse_action(token, USAGE_HOLD)?,
            })
        }
        "release" => match args {
            [] => Ok(ScriptCommand::Release { action: None }),
            [token] if token.eq_ignore_ascii_case("all") => Ok(ScriptCommand::Release { action: None }),
            [token] => Ok(ScriptCommand::Release {
                action: Some(parse_action(token, USAGE_RELEASE)?),
            }),
            _ => Err(CommandParseError::new("expected at most one direction", USAGE_RELEASE)),
        },
        "goto" => {
            let (map, cell) = parse_map_and_cell(args, USAGE_GOTO)?;
            Ok(ScriptCommand::Goto { map, cell })
        }
        "goto-named" => {
            if args.is_empty() {
                return Err(CommandParseError::new("missing destination name", USAGE_GOTO_NAMED));
            }
            Ok(ScriptCommand::GotoNamed { name: args.join(" ") })
        }
        "teleport" => {
            let (map, cell) = parse_map_and_cell(args, USAGE_TELEPORT)?;
            Ok(ScriptCommand::Teleport { map, cell })
        }
        "switch" => {
            let [map] = args else {
                return Err(CommandParseError::new("expected exactly one argument <map>", USAGE_SWITCH));
            };
            Ok(ScriptCommand::Switch {
                map: MapId::from(map.as_str()),
            })
        }
        "noclip" => {
            let [flag] = args else {
                return Err(CommandParseError::new("expected exactly one argument", USAGE_NOCLIP));
            };
            let enabled = match flag.to_ascii_lowercase().as_str() {
                "on" | "true" | "1" => true,
                "off" | "false" | "0" => false,
                _ => {
                    return Err(CommandParseError::new(
                        format!("invalid flag '{flag}' (expected on|off)"),
                        USAGE_NOCLIP,
                    ))
                }
            };
            Ok(ScriptCommand::Noclip { enabled })
        }
        "hide" => Ok(ScriptCommand::Hide {
            layer: single_name(args, USAGE_HIDE)?,
        }),
        "show" => Ok(ScriptCommand::Show {
            layer: single_name(args, USAGE_SHOW)?,
        }),
        "save" => Ok(ScriptCommand::Save {
            slot: parse_slot(args)?,
        }),
        other => Err(CommandParseError::new(
            format!("unknown command '{other}'"),
            "wait|hold|release|goto|goto-named|teleport|switch|noclip|hide|show|save",
        )),
    }
}

fn parse_action(token: &str, usage: &'static str) -> Result<InputAction, CommandParseError> {
    InputAction::from_token(token)
        .ok_or_else(|| CommandParseError::new(format!("unknown direction '{token}'"), usage))
}

fn parse_map_and_cell(args: &[String], usage: &'static str) -> Result<(MapId, Cell), CommandParseError> {
    let [map, x, y] = args else {
        return Err(CommandParseError::new("expected <map> <x> <y>", usage));
    };
    let parse_axis = |raw: &str, axis: &str| {
        raw.parse::<i32>().map_err(|_| {
            CommandParseError::new(format!("invalid {axis} coordinate '{raw}' (expected i32)"), usage)
        })
    };
    Ok((
        MapId::from(map.as_str()),
        Cell::new(parse_axis(x, "x")?, parse_axis(y, "y")?),
    ))
}

fn single_name(args: &[String], usage: &'static str) -> Result<String, CommandParseError> {
    match args {
        [name] if !name.is_empty() => Ok(name.clone()),
        _ => Err(CommandParseError::new("expected exactly one name", usage)),
    }
}

fn parse_slot(args: &[String]) -> Result<String, CommandParseError> {
    let slot = single_name(args, USAGE_SAVE)?;
    let valid = slot
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if !valid {
        return Err(CommandParseError::new(
            format!("invalid slot '{slot}' (letters, digits, '-' and '_' only)"),
            USAGE_SAVE,
        ));
    }
    Ok(slot)
}

fn tokenize_line(line: &str) -> Result<Vec<String>, CommandParseError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut pending = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                pending = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if pending {
                    tokens.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            _ => {
                current.push(ch);
                pending = true;
            }
        }
    }

    if in_quotes {
        return Err(CommandParseError::new("unterminated quoted string", "\"name with spaces\""));
    }
    if pending {
        tokens.push(current);
    }
    Ok(tokens)
}
