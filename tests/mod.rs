//! Main test module for difftree
//!
//! This module includes all test suites:
//! - Integration tests for the documented diff scenarios
//! - Property-based tests for table and codec invariants
//! - Edge cases that do not fit either

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::difftree::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_empty_directory() {
        let old = TempDir::new().unwrap();
        let new = TempDir::new().unwrap();

        let mut state = RunState::new(DiffConfig::default(), CancelToken::new()).unwrap();
        let mut lines: Vec<ReportLine> = Vec::new();
        let report = state.process_argument(old.path(), &mut lines).unwrap();
        assert_eq!(report.summary.records, 0);

        let report = state.process_argument(new.path(), &mut lines).unwrap();
        assert_eq!(report.summary.total_changes(), 0);
        assert!(lines.is_empty());
    }

    #[test]
    fn test_unicode_and_pipe_in_names() {
        let old = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let saved = out_dir.path().join("names.dt");
        for name in ["naïve.txt", "a|b.txt", "quote\"d.txt", "space name"] {
            fs::write(old.path().join(name), name).unwrap();
        }

        let config = DiffConfigBuilder::new()
            .digest(DigestKind::Legacy16)
            .output(&saved)
            .build()
            .unwrap();
        let mut state = RunState::new(config, CancelToken::new()).unwrap();
        let mut lines: Vec<ReportLine> = Vec::new();
        state.process_argument(old.path(), &mut lines).unwrap();

        // Reloading the saved file reproduces every name
        let report = state.process_argument(&saved, &mut lines).unwrap();
        assert_eq!(report.summary.records, 4);
        assert!(lines.is_empty(), "{:?}", lines);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_not_followed() {
        let old = TempDir::new().unwrap();
        let new = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        fs::write(target.path().join("inside"), "x").unwrap();
        std::os::unix::fs::symlink(target.path(), new.path().join("link")).unwrap();

        let mut state = RunState::new(DiffConfig::default(), CancelToken::new()).unwrap();
        let mut lines: Vec<ReportLine> = Vec::new();
        state.process_argument(old.path(), &mut lines).unwrap();
        state.process_argument(new.path(), &mut lines).unwrap();

        let rendered: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
        assert_eq!(rendered, vec!["+ sl [link]"]);
    }

    #[test]
    fn test_unsupported_root() {
        let mut state = RunState::new(DiffConfig::default(), CancelToken::new()).unwrap();
        let mut lines: Vec<ReportLine> = Vec::new();
        let missing = TempDir::new().unwrap().path().join("gone");
        let err = state.process_argument(&missing, &mut lines).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_plain_text_file_is_not_a_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "just some notes\n").unwrap();

        let mut state = RunState::new(DiffConfig::default(), CancelToken::new()).unwrap();
        let mut lines: Vec<ReportLine> = Vec::new();
        let err = state.process_argument(&path, &mut lines).unwrap_err();
        assert!(err.is_corruption());
    }
}
