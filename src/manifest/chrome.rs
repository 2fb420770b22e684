//! `chrome.manifest` registration files.
//!
//! One instruction per line: a type word followed by whitespace-separated
//! arguments. `#` starts a comment.

/// One instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromeEntry {
    pub kind: String,
    pub args: Vec<String>,
    /// Manifest file the entry came from.
    pub file: String,
    pub line: usize,
}

/// Where a `chrome://` URL lands inside the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromeTarget {
    /// Archive inside the package (`jar:` registrations).
    pub archive: Option<String>,
    pub path: String,
}

#[derive(Debug, Clone, Default)]
pub struct ChromeManifest {
    entries: Vec<ChromeEntry>,
}

impl ChromeManifest {
    pub fn parse(source: &str, file: &str) -> Self {
        let mut manifest = Self::default();
        manifest.extend(source, file);
        manifest
    }

    /// Append the entries of another manifest (`manifest` instructions).
    pub fn extend(&mut self, source: &str, file: &str) {
        for (index, raw) in source.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("");
            let mut words = line.split_whitespace();
            let Some(kind) = words.next() else {
                continue;
            };
            self.entries.push(ChromeEntry {
                kind: kind.to_string(),
                args: words.map(str::to_string).collect(),
                file: file.to_string(),
                line: index + 1,
            });
        }
    }

    pub fn entries(&self) -> &[ChromeEntry] {
        &self.entries
    }

    /// Entries of `kind` whose leading arguments equal `args`.
    pub fn get_entries<'s: 'q, 'q>(
        &'s self,
        kind: &'q str,
        args: &'q [&'q str],
    ) -> impl Iterator<Item = &'s ChromeEntry> + 'q {
        self.entries.iter().filter(move |e| {
            e.kind == kind
                && e.args.len() >= args.len()
                && e.args.iter().zip(args).all(|(a, b)| a == b)
        })
    }

    /// Names of the registered `content` packages.
    pub fn content_packages(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .get_entries("content", &[])
            .filter_map(|e| e.args.first().map(String::as_str))
            .collect();
        names.dedup();
        names
    }

    /// `(overlaid, overlay)` URL pairs.
    pub fn overlays(&self) -> Vec<(&str, &str)> {
        self.get_entries("overlay", &[])
            .filter_map(|e| match e.args.as_slice() {
                [target, overlay, ..] => Some((target.as_str(), overlay.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Map a `chrome://<package>/<provider>/<path>` URL to package contents.
    pub fn resolve_chrome_url(&self, url: &str) -> Option<ChromeTarget> {
        let rest = url.strip_prefix("chrome://")?;
        let mut parts = rest.splitn(3, '/');
        let package = parts.next()?;
        let provider = parts.next()?;
        let path = parts.next().unwrap_or("");

        let wanted = [package];
        let entry = self.get_entries(provider, &wanted).next()?;
        // skin and locale registrations carry a provider name before the path
        let base = match provider {
            "content" => entry.args.get(1)?,
            _ => entry.args.get(2)?,
        };
        Some(join_target(base, path))
    }
}

fn join_target(base: &str, path: &str) -> ChromeTarget {
    if let Some(jar) = base.strip_prefix("jar:") {
        if let Some((archive, inner)) = jar.split_once("!/") {
            return ChromeTarget {
                archive: Some(archive.trim_start_matches('/').to_string()),
                path: join(inner, path),
            };
        }
    }
    ChromeTarget {
        archive: None,
        path: join(base, path),
    }
}

fn join(base: &str, path: &str) -> String {
    let base = base.trim_start_matches("./").trim_start_matches('/');
    if base.is_empty() || base.ends_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}
