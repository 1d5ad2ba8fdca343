//! Line-oriented readers for the seed file and the manual exclusion file.
//! Both share the same shape: one entry per line, `#` comments, blank lines
//! skipped.

use std::path::Path;

use crate::ConfigError;

/// Reads one URL per line from `path`.
pub fn read_seed_urls(path: &Path) -> Result<Vec<String>, ConfigError> {
    Ok(read_lines(path)?)
}

/// Reads one excluded domain per line from `path`.
pub fn read_excluded_domains(path: &Path) -> Result<Vec<String>, ConfigError> {
    Ok(read_lines(path)?
        .into_iter()
        .map(|line| line.to_lowercase())
        .collect())
}

fn read_lines(path: &Path) -> Result<Vec<String>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    #[test]
    fn reads_seed_urls_skipping_comments_and_blanks() {
        let file = write_temp("https://a.com/\n# a comment\n\nhttps://b.com/\n");
        let urls = read_seed_urls(file.path()).unwrap();
        assert_eq!(urls, vec!["https://a.com/", "https://b.com/"]);
    }

    #[test]
    fn reads_excluded_domains_lowercased() {
        let file = write_temp("Bad.com\nEVIL.example.com\n");
        let domains = read_excluded_domains(file.path()).unwrap();
        assert_eq!(domains, vec!["bad.com", "evil.example.com"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = read_seed_urls(Path::new("/nonexistent/seeds.txt"));
        assert!(result.is_err());
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let file = write_temp("  https://a.com/  \n\t\n");
        let urls = read_seed_urls(file.path()).unwrap();
        assert_eq!(urls, vec!["https://a.com/"]);
    }
}
