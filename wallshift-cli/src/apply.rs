use std::path::Path;
use std::process::Command;

use tracing::{error, info};
use wallshift_engine::BackgroundApplier;

/// Applies a wallpaper by running a user-supplied command template with
/// `{path}` substituted. Without a template the selected file is only
/// reported, which keeps the tool usable on headless systems.
pub struct CommandApplier {
    template: Option<String>,
}

impl CommandApplier {
    pub fn new(template: Option<String>) -> Self {
        Self { template }
    }
}

impl BackgroundApplier for CommandApplier {
    fn apply(&self, path: &Path) -> bool {
        let Some(template) = &self.template else {
            info!(path = ?path, "no apply command configured, wallpaper ready");
            return true;
        };

        let rendered = template.replace("{path}", &path.to_string_lossy());
        let mut parts = rendered.split_whitespace();
        let Some(program) = parts.next() else {
            error!("apply command template is empty");
            return false;
        };

        match Command::new(program).args(parts).status() {
            Ok(status) if status.success() => {
                info!(path = ?path, command = %rendered, "wallpaper applied");
                true
            }
            Ok(status) => {
                error!(command = %rendered, code = ?status.code(), "apply command failed");
                false
            }
            Err(e) => {
                error!(command = %rendered, error = %e, "failed to run apply command");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_template_reports_success() {
        let applier = CommandApplier::new(None);
        assert!(applier.apply(Path::new("/tmp/pic.jpg")));
    }

    #[test]
    fn failing_command_reports_failure() {
        let applier = CommandApplier::new(Some("false {path}".to_string()));
        assert!(!applier.apply(Path::new("/tmp/pic.jpg")));
    }

    #[test]
    fn succeeding_command_reports_success() {
        let applier = CommandApplier::new(Some("true {path}".to_string()));
        assert!(applier.apply(Path::new("/tmp/pic.jpg")));
    }

    #[test]
    fn missing_program_reports_failure() {
        let applier = CommandApplier::new(Some("definitely-not-a-real-binary {path}".to_string()));
        assert!(!applier.apply(Path::new("/tmp/pic.jpg")));
    }
}
