// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The idea pool: an ordered list of free-text ideas with bold titles,
//! stored as a markdown scratch file (`ideas.md`).

/// Parsed idea pool: one title per `**Bold Title**` line, in file order.
#[derive(Debug, Clone, Default)]
pub struct IdeaPool {
    pub titles: Vec<String>,
}

/// Parse `ideas.md`-style content: each idea is a line of the form
/// `- **Title**: optional detail` or a bare `**Title**` line. Lines that
/// don't match are ignored.
pub fn parse_ideas(content: &str) -> IdeaPool {
    let mut titles = Vec::new();
    for line in content.lines() {
        let line = line.trim().trim_start_matches('-').trim();
        if let Some(rest) = line.strip_prefix("**") {
            if let Some(end) = rest.find("**") {
                let title = &rest[..end];
                if !title.is_empty() {
                    titles.push(title.to_string());
                }
            }
        }
    }
    IdeaPool { titles }
}
