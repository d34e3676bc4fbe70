use std::{path::PathBuf, process::Command, time::Instant};

use crate::{
    error::{Error, Result},
    script::Script,
};

pub const DEFAULT_OSASCRIPT: &str = "/usr/bin/osascript";

/// Blocking scripted call into the player.
///
/// Implementations run on the background worker thread only.
pub trait Automation: Send {
    fn execute(&mut self, script: &Script) -> Result<String>;
}

impl<A: Automation + ?Sized> Automation for Box<A> {
    fn execute(&mut self, script: &Script) -> Result<String> {
        (**self).execute(script)
    }
}

/// Runs scripts through the `osascript` interpreter.
#[derive(Clone, Debug)]
pub struct OsaScript {
    program: PathBuf,
}

impl Default for OsaScript {
    fn default() -> Self {
        Self::new(DEFAULT_OSASCRIPT)
    }
}

impl OsaScript {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Automation for OsaScript {
    fn execute(&mut self, script: &Script) -> Result<String> {
        let started = Instant::now();
        // -ss prints the result as source so lists, strings and raw data survive.
        let output = Command::new(&self.program)
            .arg("-ss")
            .arg("-e")
            .arg(&script.source)
            .output()
            .map_err(|source| Error::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        tracing::trace!(
            kind = ?script.kind,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "osascript finished"
        );

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(Error::ScriptFailed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptBuilder;

    #[test]
    fn missing_interpreter_is_a_spawn_error() {
        let mut osa = OsaScript::new("/nonexistent/osascript");
        let err = osa
            .execute(&ScriptBuilder::default().state_query())
            .unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }
}
