//! Window id lookup for parenting prompt dialogs.

use std::process::{Command, Stdio};
use std::sync::Arc;

use crate::config::PromptConfig;
use crate::{Error, Result};

/// Supplies the platform window id passed to `Prompt()`.
///
/// Failures are fatal to the prompt: implementations return
/// [`Error::WindowId`] rather than guessing an id.
pub trait WindowIdProvider: Send + Sync {
    fn active_window_id(&self) -> Result<String>;
}

/// A window id fixed by configuration.
#[derive(Debug, Clone)]
pub struct FixedWindowId(pub String);

impl WindowIdProvider for FixedWindowId {
    fn active_window_id(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Runs an external command (xprop by default) and parses its output.
#[derive(Debug, Clone)]
pub struct CommandWindowId {
    program: String,
    args: Vec<String>,
}

impl CommandWindowId {
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::WindowId("prompt.window_id_command is empty".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl WindowIdProvider for CommandWindowId {
    fn active_window_id(&self) -> Result<String> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| Error::WindowId(format!("failed to run {}: {e}", self.program)))?;
        if !output.status.success() {
            return Err(Error::WindowId(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }
        let id = parse_window_id(&output.stdout)?;
        tracing::debug!(window_id = %id, "active window id");
        Ok(id)
    }
}

/// Parse `<atom> <id>` (xprop's `32x ' $0'` format) into `<id>`; output with
/// no space is taken whole. The id must be a window number, hex (`0x..`) or
/// decimal, so xprop's `<atom>:  not found.` is rejected.
pub fn parse_window_id(stdout: &[u8]) -> Result<String> {
    let text = String::from_utf8_lossy(stdout);
    let id = match text.split_once(' ') {
        Some((_, id)) => id,
        None => text.as_ref(),
    }
    .trim();
    if id.is_empty() {
        return Err(Error::WindowId("window id command printed nothing".to_string()));
    }
    if !is_window_number(id) {
        return Err(Error::WindowId(format!("not a window id: {id:?}")));
    }
    Ok(id.to_string())
}

fn is_window_number(id: &str) -> bool {
    match id.strip_prefix("0x").or_else(|| id.strip_prefix("0X")) {
        Some(hex) => !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => id.chars().all(|c| c.is_ascii_digit()),
    }
}

/// Pick the provider the prompt config asks for.
pub fn from_config(config: &PromptConfig) -> Result<Arc<dyn WindowIdProvider>> {
    match &config.window_id {
        Some(id) => Ok(Arc::new(FixedWindowId(id.clone()))),
        None => Ok(Arc::new(CommandWindowId::new(&config.window_id_command)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_xprop_output() {
        let id = parse_window_id(b"_NET_ACTIVE_WINDOW 0x3a00007\n").unwrap();
        assert_eq!(id, "0x3a00007");
    }

    #[test]
    fn bare_output_is_taken_whole() {
        assert_eq!(parse_window_id(b"  12345\n").unwrap(), "12345");
    }

    #[test]
    fn empty_output_is_an_error() {
        assert!(matches!(parse_window_id(b"\n"), Err(Error::WindowId(_))));
        assert!(matches!(parse_window_id(b"_NET_ACTIVE_WINDOW \n"), Err(Error::WindowId(_))));
    }

    #[test]
    fn unset_atom_is_an_error() {
        let err = parse_window_id(b"_NET_ACTIVE_WINDOW:  not found.\n").unwrap_err();
        assert!(matches!(err, Error::WindowId(ref why) if why.contains("not found.")));
        assert!(matches!(parse_window_id(b"_NET_ACTIVE_WINDOW 0x\n"), Err(Error::WindowId(_))));
        assert!(matches!(parse_window_id(b"_NET_ACTIVE_WINDOW 0xzz\n"), Err(Error::WindowId(_))));
    }

    #[test]
    fn decimal_and_upper_hex_ids() {
        assert_eq!(parse_window_id(b"_NET_ACTIVE_WINDOW 60817415\n").unwrap(), "60817415");
        assert_eq!(parse_window_id(b"_NET_ACTIVE_WINDOW 0X3A00007\n").unwrap(), "0X3A00007");
    }

    #[test]
    fn fixed_id_from_config() {
        let config = PromptConfig {
            window_id: Some(String::new()),
            ..PromptConfig::default()
        };
        let provider = from_config(&config).unwrap();
        assert_eq!(provider.active_window_id().unwrap(), "");
    }

    #[test]
    fn empty_command_is_rejected() {
        let config = PromptConfig {
            window_id_command: Vec::new(),
            ..PromptConfig::default()
        };
        assert!(matches!(from_config(&config), Err(Error::WindowId(_))));
    }

    #[test]
    fn missing_program_is_fatal() {
        let provider =
            CommandWindowId::new(&["/nonexistent/sesame-window-id".to_string()]).unwrap();
        assert!(matches!(provider.active_window_id(), Err(Error::WindowId(_))));
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_is_fatal() {
        let provider = CommandWindowId::new(&["false".to_string()]).unwrap();
        assert!(matches!(provider.active_window_id(), Err(Error::WindowId(_))));
    }

    #[cfg(unix)]
    #[test]
    fn runs_command() {
        let provider = CommandWindowId::new(&[
            "echo".to_string(),
            "_NET_ACTIVE_WINDOW".to_string(),
            "0x1c00003".to_string(),
        ])
        .unwrap();
        assert_eq!(provider.active_window_id().unwrap(), "0x1c00003");
    }
}
