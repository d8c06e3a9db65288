//! Artifact comparison.
//!
//! Invokes an external comparison tool (a structural differ when one is
//! configured, plain recursive `diff` otherwise) and reduces its exit
//! status to a three-way outcome: identical, different, or the tool itself
//! broke. Only 0 and 1 are verdicts; anything else is an error and is
//! never interpreted as "different".

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::process::Cmd;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffVerdict {
    Identical,
    Different,
}

impl DiffVerdict {
    pub fn is_identical(self) -> bool {
        matches!(self, DiffVerdict::Identical)
    }
}

/// Result of one comparison: the verdict, the tool's combined output, and
/// the report file it was tee'd to (when a report path was given).
#[derive(Debug)]
pub struct Comparison {
    pub verdict: DiffVerdict,
    pub output: String,
    pub report: Option<PathBuf>,
}

/// Compare two artifact directories.
///
/// `diff_command` is the tool argv template; the two directories are
/// appended. `report` names a file the combined output is written to as
/// well as returned.
pub fn compare(
    dir_a: &Path,
    dir_b: &Path,
    diff_command: Option<&[String]>,
    report: Option<&Path>,
) -> Result<Comparison> {
    let fallback = ["diff".to_string(), "-ru".to_string()];
    let template: &[String] = diff_command.unwrap_or(&fallback);
    let (program, args) = template
        .split_first()
        .ok_or_else(|| Error::protocol("empty diff tool argv"))?;

    let result = Cmd::new(program)
        .args(args.iter().map(String::as_str))
        .arg_path(dir_a)
        .arg_path(dir_b)
        .allow_fail()
        .run()?;

    let mut output = result.stdout.clone();
    output.push_str(&result.stderr);

    let report = match report {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, &output)?;
            Some(path.to_path_buf())
        }
        None => None,
    };

    let verdict = match result.code() {
        0 => DiffVerdict::Identical,
        1 => DiffVerdict::Different,
        code => return Err(Error::DifferTool(code)),
    };

    Ok(Comparison {
        verdict,
        output,
        report,
    })
}

/// Replace a verified-identical artifact tree with a relative symlink to
/// the reference tree, so duplicate bytes are not stored twice.
pub fn link_duplicate(reference: &Path, duplicate: &Path) -> Result<()> {
    fs::remove_dir_all(duplicate)?;
    let target: PathBuf = if reference.parent() == duplicate.parent() {
        reference
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| reference.to_path_buf())
    } else {
        reference.to_path_buf()
    };
    std::os::unix::fs::symlink(target, duplicate)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tree(tmp: &TempDir, name: &str, content: &str) -> PathBuf {
        let dir = tmp.path().join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("out.txt"), content).unwrap();
        dir
    }

    #[test]
    fn test_compare_directory_with_itself() {
        let tmp = TempDir::new().unwrap();
        let d = tree(&tmp, "a", "hello\n");
        let cmp = compare(&d, &d, None, None).unwrap();
        assert_eq!(cmp.verdict, DiffVerdict::Identical);
    }

    #[test]
    fn test_compare_is_symmetric() {
        let tmp = TempDir::new().unwrap();
        let a = tree(&tmp, "a", "hello\n");
        let b = tree(&tmp, "b", "world\n");

        let ab = compare(&a, &b, None, None).unwrap();
        let ba = compare(&b, &a, None, None).unwrap();
        assert_eq!(ab.verdict, DiffVerdict::Different);
        assert_eq!(ab.verdict, ba.verdict);

        let c = tree(&tmp, "c", "hello\n");
        assert_eq!(compare(&a, &c, None, None).unwrap().verdict, DiffVerdict::Identical);
        assert_eq!(compare(&c, &a, None, None).unwrap().verdict, DiffVerdict::Identical);
    }

    #[test]
    fn test_report_file_carries_the_diff() {
        let tmp = TempDir::new().unwrap();
        let a = tree(&tmp, "a", "1111\n");
        let b = tree(&tmp, "b", "2222\n");
        let report = tmp.path().join("reports/experiment-1.diff");

        let cmp = compare(&a, &b, None, Some(&report)).unwrap();
        assert_eq!(cmp.verdict, DiffVerdict::Different);
        assert_eq!(cmp.report.as_deref(), Some(report.as_path()));

        let written = fs::read_to_string(&report).unwrap();
        assert_eq!(written, cmp.output);
        assert!(written.contains("1111"));
        assert!(written.contains("2222"));
    }

    #[test]
    fn test_tool_breakage_is_an_error_not_a_verdict() {
        let tmp = TempDir::new().unwrap();
        let a = tree(&tmp, "a", "x\n");
        let template = vec!["sh".to_string(), "-c".to_string(), "exit 3".to_string()];
        let err = compare(&a, &a, Some(&template), None).err().unwrap();
        assert!(matches!(err, Error::DifferTool(3)));
    }

    #[test]
    fn test_link_duplicate_points_at_reference() {
        let tmp = TempDir::new().unwrap();
        let a = tree(&tmp, "control", "same\n");
        let b = tree(&tmp, "experiment-1", "same\n");

        link_duplicate(&a, &b).unwrap();
        assert!(b.is_symlink());
        assert_eq!(fs::read_link(&b).unwrap(), PathBuf::from("control"));
        // The link still resolves to the reference content.
        assert_eq!(fs::read_to_string(b.join("out.txt")).unwrap(), "same\n");
    }
}
