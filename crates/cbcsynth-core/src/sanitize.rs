//! Working-copy preparation: strip environment-specific KeY directives.
//!
//! `\javaSource`, `\classpath` and `\bootclasspath` point at paths relative
//! to the original project folder and break once the script is relocated
//! into a per-run working folder.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info};

use crate::error::{CbcError, Result};

/// Helper script some projects keep next to their statement files.
pub const HELPER_SCRIPT: &str = "helper.key";

fn directive_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?mi)^[ \t]*\\(?:javaSource|classpath|bootclasspath)\b[^\n]*(?:\n|$)")
            .expect("valid regex")
    })
}

/// Remove every source-path/classpath directive line from `text`.
pub fn sanitize_text(text: &str) -> String {
    directive_line().replace_all(text, "").into_owned()
}

/// Sanitize a script in place. Running it twice is a no-op the second time.
pub fn sanitize(path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)?;
    let cleaned = sanitize_text(&text);
    if cleaned != text {
        std::fs::write(path, cleaned)?;
        debug!(path = %path.display(), "removed path directives");
    }
    Ok(())
}

/// Copy `script` (and a sibling `helper.key`, if any) into `working_dir`
/// and sanitize the copies. Returns the path of the working copy.
pub fn prepare_working_copy(script: &Path, working_dir: &Path) -> Result<PathBuf> {
    if !script.is_file() {
        return Err(CbcError::MissingCollaboratorFile {
            path: script.to_path_buf(),
        });
    }
    let file_name = script
        .file_name()
        .ok_or_else(|| CbcError::MissingCollaboratorFile {
            path: script.to_path_buf(),
        })?;

    std::fs::create_dir_all(working_dir)?;
    let copy = working_dir.join(file_name);
    std::fs::copy(script, &copy)?;
    sanitize(&copy)?;

    if let Some(helper) = script.parent().map(|dir| dir.join(HELPER_SCRIPT)) {
        if helper.is_file() {
            let helper_copy = working_dir.join(HELPER_SCRIPT);
            std::fs::copy(&helper, &helper_copy)?;
            sanitize(&helper_copy)?;
        }
    }

    info!(working_copy = %copy.display(), "prepared working copy");
    Ok(copy)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = "\\javaSource \"../src\";\n  \\classpath \"lib\";\n\\BOOTCLASSPATH \"jdk\";\n\\programVariables { int x; }\n\\pre{ x >= 0 }\n";

    #[test]
    fn test_removes_all_three_directives() {
        let out = sanitize_text(SCRIPT);
        assert_eq!(out, "\\programVariables { int x; }\n\\pre{ x >= 0 }\n");
    }

    #[test]
    fn test_sanitize_text_is_idempotent() {
        let once = sanitize_text(SCRIPT);
        assert_eq!(sanitize_text(&once), once);
    }

    #[test]
    fn test_directive_mid_line_is_kept() {
        let text = "// see \\classpath docs\n\\pre{a}\n";
        assert_eq!(sanitize_text(text), text);
    }

    #[test]
    fn test_directive_on_last_line_without_newline() {
        let text = "\\pre{a}\n\\classpath \"lib\";";
        assert_eq!(sanitize_text(text), "\\pre{a}\n");
    }

    #[test]
    fn test_sanitize_file_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Statement1.key");
        std::fs::write(&path, SCRIPT).unwrap();

        sanitize(&path).unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        sanitize(&path).unwrap();
        let second = std::fs::read_to_string(&path).unwrap();
        assert_eq!(first, second);
        assert!(!second.contains("javaSource"));
    }

    #[test]
    fn test_prepare_working_copy_copies_helper() {
        let project = tempfile::tempdir().unwrap();
        let script = project.path().join("Statement2.key");
        std::fs::write(&script, SCRIPT).unwrap();
        std::fs::write(project.path().join(HELPER_SCRIPT), "\\classpath \"x\";\nhelper\n").unwrap();

        let work = project.path().join("temp_Statement2_0");
        let copy = prepare_working_copy(&script, &work).unwrap();

        assert_eq!(copy, work.join("Statement2.key"));
        assert!(!std::fs::read_to_string(&copy).unwrap().contains("classpath"));
        assert_eq!(
            std::fs::read_to_string(work.join(HELPER_SCRIPT)).unwrap(),
            "helper\n"
        );
        // The source is left untouched.
        assert_eq!(std::fs::read_to_string(&script).unwrap(), SCRIPT);
    }

    #[test]
    fn test_prepare_working_copy_missing_script() {
        let dir = tempfile::tempdir().unwrap();
        let err = prepare_working_copy(&dir.path().join("nope.key"), dir.path()).unwrap_err();
        assert!(matches!(err, CbcError::MissingCollaboratorFile { .. }));
    }
}
