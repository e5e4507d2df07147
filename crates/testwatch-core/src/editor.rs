//! "Open in editor" command lines.

use std::path::{Path, PathBuf};

use crate::config::{Config, ConfigError};
use crate::model::{Project, Suite};

/// The editor template for a suite: its own editor when configured,
/// otherwise the default one.
pub fn editor_bin<'a>(config: &'a Config, suite: Option<&Suite>) -> Result<&'a str, ConfigError> {
    let named = suite
        .and_then(|s| s.settings.editor.as_deref())
        .and_then(|id| config.editors.get(id));

    match named.or_else(|| config.default_editor()) {
        Some(editor) => Ok(editor.bin.as_str()),
        None => Err(ConfigError::NoDefaultEditor),
    }
}

/// Prefixes relative files with the project root.
pub fn add_project_root_path(file: &str, project: Option<&Project>) -> PathBuf {
    let path = Path::new(file);
    match project {
        Some(project) if !path.is_absolute() => project.path.join(path),
        _ => path.to_path_buf(),
    }
}

/// Decodes the hex-encoded file name carried by editor links.
pub fn decode_file_reference(encoded: &str) -> Option<String> {
    let bytes = hex::decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}

/// Builds the command opening `file` at `line`.
pub fn edit_command(
    config: &Config,
    suite: Option<&Suite>,
    project: Option<&Project>,
    file: &str,
    line: Option<u32>,
) -> Result<String, ConfigError> {
    let bin = editor_bin(config, suite)?;
    let file = add_project_root_path(file, project);

    Ok(bin
        .replace("{file}", &file.to_string_lossy())
        .replace("{line}", &line.map(|l| l.to_string()).unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EditorConfig;
    use crate::model::{ProjectId, SuiteId, SuiteSettings, TesterId};

    fn config() -> Config {
        let mut config = Config::default();
        config.editors.insert(
            "vim".to_string(),
            EditorConfig {
                bin: "vim +{line} {file}".to_string(),
                default: true,
            },
        );
        config.editors.insert(
            "code".to_string(),
            EditorConfig {
                bin: "code --goto {file}:{line}".to_string(),
                default: false,
            },
        );
        config
    }

    fn project() -> Project {
        Project {
            id: ProjectId(1),
            name: "app".to_string(),
            path: PathBuf::from("/srv/app"),
            tests_path: PathBuf::from("tests"),
            enabled: true,
            depends: vec![],
            exclusions: vec![],
        }
    }

    fn suite(editor: Option<&str>) -> Suite {
        Suite {
            id: SuiteId(2),
            name: "unit".to_string(),
            project_id: ProjectId(1),
            tester_id: TesterId(3),
            settings: SuiteSettings {
                editor: editor.map(str::to_string),
                ..SuiteSettings::default()
            },
        }
    }

    #[test]
    fn test_suite_editor() {
        let cmd = edit_command(
            &config(),
            Some(&suite(Some("code"))),
            Some(&project()),
            "tests/UserTest.php",
            Some(12),
        )
        .unwrap();
        assert_eq!(cmd, "code --goto /srv/app/tests/UserTest.php:12");
    }

    #[test]
    fn test_unknown_editor_falls_back_to_default() {
        let cmd = edit_command(
            &config(),
            Some(&suite(Some("emacs"))),
            Some(&project()),
            "/abs/File.php",
            Some(3),
        )
        .unwrap();
        assert_eq!(cmd, "vim +3 /abs/File.php");
    }

    #[test]
    fn test_missing_default_is_fatal() {
        let result = edit_command(&Config::default(), None, None, "a.php", None);
        assert!(matches!(result, Err(ConfigError::NoDefaultEditor)));
    }

    #[test]
    fn test_decode_file_reference() {
        let encoded = hex::encode("tests/UserTest.php");
        assert_eq!(
            decode_file_reference(&encoded).as_deref(),
            Some("tests/UserTest.php")
        );
        assert!(decode_file_reference("zz").is_none());
    }
}
