use std::fmt::{Display, Formatter};

use kome_core::{AppError, AppResult};
use url::Url;

/// Identity of the pull request thread that receives the status comment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PullRequestRef {
    owner: String,
    repo: String,
    number: u64,
}

impl PullRequestRef {
    /// Creates a validated pull request reference.
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, number: u64) -> AppResult<Self> {
        let owner = owner.into();
        let repo = repo.into();

        if owner.trim().is_empty() || repo.trim().is_empty() {
            return Err(AppError::Validation(
                "pull request owner and repo must not be empty".to_owned(),
            ));
        }

        Ok(Self {
            owner,
            repo,
            number,
        })
    }

    /// Parses a pull request URL of the form `https://<host>/<owner>/<repo>/pull/<number>`.
    pub fn parse_url(input: &str) -> AppResult<Self> {
        let url = Url::parse(input)
            .map_err(|error| AppError::Config(format!("invalid pull request URL '{input}': {error}")))?;

        let segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.filter(|segment| !segment.is_empty()).collect())
            .unwrap_or_default();

        let [owner, repo, marker, number] = segments.as_slice() else {
            return Err(AppError::Config(format!(
                "pull request URL '{input}' must have an <owner>/<repo>/pull/<number> path"
            )));
        };

        if *marker != "pull" {
            return Err(AppError::Config(format!(
                "pull request URL '{input}' must have an <owner>/<repo>/pull/<number> path"
            )));
        }

        let number = number.parse::<u64>().map_err(|error| {
            AppError::Config(format!(
                "invalid pull request number '{number}' in URL '{input}': {error}"
            ))
        })?;

        Self::new(*owner, *repo, number)
    }

    /// Returns the repository owner.
    #[must_use]
    pub fn owner(&self) -> &str {
        self.owner.as_str()
    }

    /// Returns the repository name.
    #[must_use]
    pub fn repo(&self) -> &str {
        self.repo.as_str()
    }

    /// Returns the pull request number.
    #[must_use]
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Returns the store path holding the pull request metadata map.
    #[must_use]
    pub fn metadata_path(&self) -> String {
        format!("pulls/{}", self.number)
    }

    /// Returns the store path holding the published comment record.
    #[must_use]
    pub fn comment_record_path(&self) -> String {
        format!("comments/{}", self.number)
    }

    /// Returns the store path holding the publish lease for this pull request.
    #[must_use]
    pub fn comment_lock_path(&self) -> String {
        format!("comments/{}/lock", self.number)
    }
}

impl Display for PullRequestRef {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// Validated git commit identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommitSha(String);

impl CommitSha {
    /// Creates a validated commit sha from a full or abbreviated hex form.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into().trim().to_ascii_lowercase();

        if !(4..=40).contains(&value.len()) {
            return Err(AppError::Validation(format!(
                "commit sha must be 4 to 40 characters, got '{value}'"
            )));
        }

        if !value.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return Err(AppError::Validation(format!(
                "commit sha must be hex, got '{value}'"
            )));
        }

        Ok(Self(value))
    }

    /// Returns the full hex form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the abbreviated form used in rendered headings.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(7)]
    }

    /// Returns the store path holding the commit metadata map.
    #[must_use]
    pub fn metadata_path(&self) -> String {
        format!("commits/{}", self.0)
    }
}

impl Display for CommitSha {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{CommitSha, PullRequestRef};

    #[test]
    fn parse_url_accepts_canonical_pull_url() {
        let parsed = PullRequestRef::parse_url("https://github.com/octo/kome/pull/42");
        assert!(parsed.is_ok());
        let pull_request = parsed.unwrap_or_else(|_| unreachable!());
        assert_eq!(pull_request.owner(), "octo");
        assert_eq!(pull_request.repo(), "kome");
        assert_eq!(pull_request.number(), 42);
        assert_eq!(pull_request.to_string(), "octo/kome#42");
    }

    #[test]
    fn parse_url_rejects_malformed_input() {
        assert!(PullRequestRef::parse_url("not a url").is_err());
        assert!(PullRequestRef::parse_url("https://github.com/octo/kome").is_err());
        assert!(PullRequestRef::parse_url("https://github.com/octo/kome/issues/42").is_err());
        assert!(PullRequestRef::parse_url("https://github.com/octo/kome/pull/abc").is_err());
    }

    #[test]
    fn paths_follow_persisted_layout() {
        let parsed = PullRequestRef::parse_url("https://github.com/octo/kome/pull/7");
        assert!(parsed.is_ok());
        let pull_request = parsed.unwrap_or_else(|_| unreachable!());
        assert_eq!(pull_request.metadata_path(), "pulls/7");
        assert_eq!(pull_request.comment_record_path(), "comments/7");
        assert_eq!(pull_request.comment_lock_path(), "comments/7/lock");
    }

    #[test]
    fn commit_sha_validates_and_abbreviates() {
        let sha = CommitSha::new("A1B2C3D4E5");
        assert!(sha.is_ok());
        let sha = sha.unwrap_or_else(|_| unreachable!());
        assert_eq!(sha.as_str(), "a1b2c3d4e5");
        assert_eq!(sha.short(), "a1b2c3d");
        assert_eq!(sha.metadata_path(), "commits/a1b2c3d4e5");

        assert!(CommitSha::new("abc").is_err());
        assert!(CommitSha::new("xyz123").is_err());
        assert!(CommitSha::new("a".repeat(41)).is_err());
    }
}
