//! Run reporting: the colored counter summary and the per-test error log.

use crate::exec::RunCounts;
use crate::model::Test;

pub const GREEN: &str = "\x1b[32m";
pub const RED: &str = "\x1b[31m";
pub const BLUE: &str = "\x1b[34m";
pub const YELLOW: &str = "\x1b[33m";
pub const AQUA: &str = "\x1b[36m";
pub const END: &str = "\x1b[0m";

/// Re-print every test that failed its response check or its schema
/// check, with enough context to find it in the plan.
pub fn log_errors(results: &[Test]) {
    println!("{AQUA}-----------------------------Errors----------------------------------{END}");
    for test in results {
        if test.response_error.is_none() && test.schema_error.is_none() {
            continue;
        }
        println!("{AQUA}--------");
        println!("{}: {}{END}", test.path, test.name);
        if let Some(response_error) = &test.response_error {
            if let Some(response) = &test.response {
                println!("{RED}Response Status Code: {}{END}", response.status);
            }
            println!("{RED}{response_error}{END}");
        }
        if let Some(schema_error) = &test.schema_error {
            println!("{YELLOW}{schema_error}{END}");
        }
    }
    println!("{AQUA}---------------------------------------------------------------------{END}");
}

/// The closing counter block.
pub fn print_summary(counts: &RunCounts) {
    println!("{GREEN}Passed: {}{END}", counts.passed);
    println!("{RED}Failed: {}{END}", counts.failed);
    println!("{BLUE}Skipped: {}{END}", counts.skipped);
    println!("{YELLOW}SchemaMismatch: {}{END}", counts.schema_mismatch);
    println!("{AQUA}Total: {}{END}", counts.total);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reporting_does_not_panic() {
        let mut failed = Test {
            name: "t".into(),
            path: "/x".into(),
            ..Test::default()
        };
        failed.response_error = Some("status 500".into());
        failed.schema_error = Some("missing field".into());
        log_errors(&[Test::default(), failed]);
        print_summary(&RunCounts {
            passed: 1,
            failed: 1,
            skipped: 0,
            schema_mismatch: 1,
            total: 2,
        });
    }
}
