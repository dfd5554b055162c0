// src/problem/report.rs

//! Stable text rendering of problem sets

use super::Problem;
use std::fmt::Write;

/// Formats problems for display
pub struct ProblemReporter;

impl ProblemReporter {
    /// Render problems most severe first
    ///
    /// Problems of equal severity keep the order they were reported in, so the
    /// same input always produces the same text.
    pub fn format(problems: &[Problem]) -> String {
        let mut ordered: Vec<(usize, &Problem)> = problems.iter().enumerate().collect();
        ordered.sort_by_key(|(idx, p)| (p.kind.severity(), *idx));

        let mut out = String::new();
        for (n, (_, problem)) in ordered.iter().enumerate() {
            let _ = writeln!(
                out,
                "Problem {} [{}]: {}",
                n + 1,
                problem.kind,
                problem.message
            );
            for pkg in &problem.implicated {
                let _ = writeln!(out, "  - {} ({})", pkg, pkg.repo());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::PackageRef;
    use crate::problem::ProblemKind;
    use crate::version::Evr;

    fn pkg(name: &str) -> PackageRef {
        PackageRef::new(name, "x86_64", Evr::parse("1.0-1").unwrap(), "fedora")
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(ProblemReporter::format(&[]), "");
    }

    #[test]
    fn test_severity_then_encounter_order() {
        let problems = vec![
            Problem::bare(ProblemKind::AlreadyInstalled, "foo is already installed"),
            Problem::bare(ProblemKind::NotFound, "No match for argument: nope"),
            Problem::new(
                ProblemKind::ProtectedPackage,
                vec![pkg("glibc")],
                "glibc is protected",
            ),
            Problem::bare(ProblemKind::Excluded, "bar is excluded"),
        ];

        let text = ProblemReporter::format(&problems);
        let expected = "\
Problem 1 [PROTECTED_PACKAGE]: glibc is protected
  - glibc-1.0-1.x86_64 (fedora)
Problem 2 [NOT_FOUND]: No match for argument: nope
Problem 3 [EXCLUDED]: bar is excluded
Problem 4 [ALREADY_INSTALLED]: foo is already installed
";
        assert_eq!(text, expected);
        assert_eq!(ProblemReporter::format(&problems), text);
    }
}
