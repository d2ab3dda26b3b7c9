//! GitHub API types and descriptor conversion
//!
//! Request and response bodies for the repository contents and commits
//! endpoints, plus conversion to store descriptors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::FileDescriptor;

/// Entry returned by `GET /repos/{owner}/{repo}/contents/{path}`
#[derive(Debug, Clone, Deserialize)]
pub struct ContentItem {
    /// Base name
    pub name: String,
    /// Full path within the repository
    pub path: String,
    /// Git blob id, required for updates and deletes
    pub sha: String,
    /// Size in bytes (0 for directories)
    #[serde(default)]
    pub size: u64,
    /// "file", "dir", "symlink" or "submodule"
    #[serde(rename = "type")]
    pub kind: String,
    /// API URL of this entry
    pub url: String,
    /// Raw download URL (null for directories and very large files)
    #[serde(default)]
    pub download_url: Option<String>,
}

impl ContentItem {
    pub fn is_file(&self) -> bool {
        self.kind == "file"
    }

    /// Content is fetched from the API URL with the raw media type. It is
    /// pinned to the ref it was read at and bypasses the raw.githubusercontent
    /// cache, which can serve a previous blob for minutes after an overwrite.
    pub fn to_descriptor(&self) -> FileDescriptor {
        FileDescriptor {
            path: self.path.clone(),
            locator: self.url.clone(),
            download_url: self.download_url.clone(),
            size: self.size,
            revision: self.sha.clone(),
        }
    }
}

/// The contents endpoint returns an array for directories and an object for files
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ContentsResponse {
    Directory(Vec<ContentItem>),
    Entry(ContentItem),
}

/// Commit identity for writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Committer {
    pub name: String,
    pub email: String,
}

impl Committer {
    /// Parse `Name <email>`
    pub fn parse(value: &str) -> Option<Self> {
        let (name, rest) = value.split_once('<')?;
        let email = rest.strip_suffix('>')?.trim();
        let name = name.trim();
        if name.is_empty() || email.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            email: email.to_string(),
        })
    }
}

/// Body for `PUT /repos/{owner}/{repo}/contents/{path}`
#[derive(Debug, Serialize)]
pub struct PutContentRequest<'a> {
    pub message: &'a str,
    /// Base64-encoded file content
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committer: Option<&'a Committer>,
}

/// Body for `DELETE /repos/{owner}/{repo}/contents/{path}`
#[derive(Debug, Serialize)]
pub struct DeleteContentRequest<'a> {
    pub message: &'a str,
    pub sha: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committer: Option<&'a Committer>,
}

/// Response from a successful PUT
#[derive(Debug, Deserialize)]
pub struct PutContentResponse {
    pub content: ContentItem,
}

/// One element of `GET /repos/{owner}/{repo}/commits`
#[derive(Debug, Deserialize)]
pub struct CommitEntry {
    pub commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
pub struct CommitDetail {
    #[serde(default)]
    pub author: Option<Signature>,
    #[serde(default)]
    pub committer: Option<Signature>,
}

#[derive(Debug, Deserialize)]
pub struct Signature {
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

impl CommitEntry {
    /// Committer date, falling back to the author date
    pub fn date(&self) -> Option<DateTime<Utc>> {
        let commit = &self.commit;
        commit
            .committer
            .as_ref()
            .and_then(|s| s.date)
            .or_else(|| commit.author.as_ref().and_then(|s| s.date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_directory_listing() {
        let json = r#"[
            {
                "name": "logo.png",
                "path": "media/logo.png",
                "sha": "3d21ec53a331a6f037a91c368710b99387d012c1",
                "size": 5362,
                "url": "https://api.github.com/repos/acme/cdn/contents/media/logo.png",
                "html_url": "https://github.com/acme/cdn/blob/main/media/logo.png",
                "git_url": "https://api.github.com/repos/acme/cdn/git/blobs/3d21ec53",
                "download_url": "https://raw.githubusercontent.com/acme/cdn/main/media/logo.png",
                "type": "file",
                "_links": {"self": "x"}
            },
            {
                "name": "icons",
                "path": "media/icons",
                "sha": "a84d88e7554fc1fa21bcbc4efae3c782a70d2b9d",
                "size": 0,
                "url": "https://api.github.com/repos/acme/cdn/contents/media/icons",
                "download_url": null,
                "type": "dir"
            }
        ]"#;
        let resp: ContentsResponse = serde_json::from_str(json).unwrap();
        let items = match resp {
            ContentsResponse::Directory(items) => items,
            ContentsResponse::Entry(_) => panic!("Expected directory listing"),
        };
        assert_eq!(items.len(), 2);
        assert!(items[0].is_file());
        assert!(!items[1].is_file());

        let desc = items[0].to_descriptor();
        assert_eq!(desc.path, "media/logo.png");
        assert_eq!(desc.size, 5362);
        assert_eq!(desc.revision, "3d21ec53a331a6f037a91c368710b99387d012c1");
        assert_eq!(
            desc.locator,
            "https://api.github.com/repos/acme/cdn/contents/media/logo.png"
        );
        assert_eq!(
            desc.download_url.as_deref(),
            Some("https://raw.githubusercontent.com/acme/cdn/main/media/logo.png")
        );
    }

    #[test]
    fn test_large_file_has_no_download_url() {
        let json = r#"{
            "name": "big.bin",
            "path": "big.bin",
            "sha": "abc",
            "size": 104857600,
            "url": "https://api.github.com/repos/acme/cdn/contents/big.bin",
            "download_url": null,
            "type": "file"
        }"#;
        let resp: ContentsResponse = serde_json::from_str(json).unwrap();
        let ContentsResponse::Entry(item) = resp else {
            panic!("Expected single entry");
        };
        let desc = item.to_descriptor();
        assert_eq!(desc.locator, "https://api.github.com/repos/acme/cdn/contents/big.bin");
        assert_eq!(desc.download_url, None);
    }

    #[test]
    fn test_put_request_serialization() {
        let committer = Committer::parse("CDN Bot <cdn@example.com>").unwrap();
        let request = PutContentRequest {
            message: "Upload logo.png",
            content: "aGk=".to_string(),
            sha: None,
            branch: Some("main"),
            committer: Some(&committer),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["content"], "aGk=");
        assert_eq!(json["branch"], "main");
        assert_eq!(json["committer"]["email"], "cdn@example.com");
        assert!(json.get("sha").is_none());
    }

    #[test]
    fn test_commit_date() {
        let json = r#"[{
            "sha": "deadbeef",
            "commit": {
                "author": {"name": "a", "email": "a@x", "date": "2024-01-02T03:04:05Z"},
                "committer": {"name": "c", "email": "c@x", "date": "2024-02-03T04:05:06Z"}
            }
        }]"#;
        let commits: Vec<CommitEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(
            commits[0].date().unwrap().to_rfc3339(),
            "2024-02-03T04:05:06+00:00"
        );
    }

    #[test]
    fn test_committer_parse() {
        assert_eq!(
            Committer::parse("Jane Doe <jane@example.com>"),
            Some(Committer {
                name: "Jane Doe".to_string(),
                email: "jane@example.com".to_string()
            })
        );
        assert_eq!(Committer::parse("no email"), None);
        assert_eq!(Committer::parse("<only@email>"), None);
    }
}
