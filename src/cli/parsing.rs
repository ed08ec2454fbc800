//! Value parsers for command-line options.

use super::MAX_JOBS;

pub(super) fn parse_jobs(s: &str) -> Result<usize, String> {
    let value: usize = s
        .trim()
        .parse()
        .map_err(|_| format!("{s} is not a valid number"))?;
    if (1..=MAX_JOBS).contains(&value) {
        Ok(value)
    } else {
        Err(format!("jobs must be between 1 and {MAX_JOBS}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1", Ok(1))]
    #[case("64", Ok(64))]
    #[case("0", Err("jobs must be between 1 and 64"))]
    #[case("65", Err("jobs must be between 1 and 64"))]
    #[case("many", Err("many is not a valid number"))]
    fn jobs_are_bounded(#[case] input: &str, #[case] expected: Result<usize, &str>) {
        assert_eq!(parse_jobs(input), expected.map_err(str::to_owned));
    }
}
