//! robots.txt parsing and rule evaluation (RFC 9309).
//!
//! Evaluation is pure: the same body, user agent, and path always produce
//! the same decision. Precedence follows the longest-match rule — among
//! the allow/disallow patterns that match a path, the longest wins, and a
//! tie goes to allow.

use std::time::Duration;

/// One allow/disallow line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub allow: bool,
    pub pattern: String,
}

/// A user-agent group with its rules
#[derive(Debug, Clone, Default)]
pub struct Group {
    pub agents: Vec<String>,
    pub rules: Vec<Rule>,
    pub crawl_delay: Option<Duration>,
}

/// Parsed robots.txt body
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    groups: Vec<Group>,
    sitemaps: Vec<String>,
}

impl RobotsRules {
    /// Parse a robots.txt body. Unknown directives and malformed lines
    /// are skipped; this never fails.
    #[must_use]
    pub fn parse(body: &str) -> Self {
        let mut rules = Self::default();
        let mut current = Group::default();
        // A `User-agent` line after rules starts a new group; consecutive
        // `User-agent` lines share one group.
        let mut agents_open = false;

        for raw_line in body.lines() {
            let line = match raw_line.split_once('#') {
                Some((before, _)) => before,
                None => raw_line,
            }
            .trim();

            if line.is_empty() {
                continue;
            }

            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let field = field.trim().to_ascii_lowercase();
            let value = value.trim();

            match field.as_str() {
                "user-agent" => {
                    if !agents_open {
                        if !current.agents.is_empty() {
                            rules.groups.push(std::mem::take(&mut current));
                        }
                        agents_open = true;
                    }
                    // Tolerate comma-separated agent lists
                    for agent in value.split(',') {
                        let agent = agent.trim();
                        if !agent.is_empty() {
                            current.agents.push(agent.to_ascii_lowercase());
                        }
                    }
                }
                "allow" | "disallow" => {
                    agents_open = false;
                    if current.agents.is_empty() {
                        // Rules before any User-agent line apply to everyone
                        current.agents.push("*".to_string());
                    }
                    // An empty Disallow means "allow everything" and
                    // matches nothing as a pattern
                    if !value.is_empty() {
                        current.rules.push(Rule {
                            allow: field == "allow",
                            pattern: value.to_string(),
                        });
                    }
                }
                "crawl-delay" => {
                    agents_open = false;
                    if let Ok(secs) = value.parse::<f64>()
                        && secs.is_finite()
                        && secs >= 0.0
                    {
                        current.crawl_delay = Some(Duration::from_secs_f64(secs));
                    }
                }
                "sitemap" => {
                    // Sitemap is not group-scoped
                    rules.sitemaps.push(value.to_string());
                }
                _ => {}
            }
        }

        if !current.agents.is_empty() {
            rules.groups.push(current);
        }

        rules
    }

    /// The group whose agent token best matches `user_agent`, preferring
    /// the longest matching token; the `*` group is the fallback.
    fn group_for(&self, user_agent: &str) -> Option<&Group> {
        let ua = user_agent.to_ascii_lowercase();

        let mut best: Option<(&Group, usize)> = None;
        let mut wildcard: Option<&Group> = None;

        for group in &self.groups {
            for agent in &group.agents {
                if agent == "*" {
                    wildcard.get_or_insert(group);
                } else if ua.contains(agent.as_str())
                    && best.is_none_or(|(_, len)| agent.len() > len)
                {
                    best = Some((group, agent.len()));
                }
            }
        }

        best.map(|(g, _)| g).or(wildcard)
    }

    /// Whether `user_agent` may fetch `path` (path plus query).
    #[must_use]
    pub fn allowed(&self, user_agent: &str, path: &str) -> bool {
        let Some(group) = self.group_for(user_agent) else {
            return true;
        };

        let mut verdict = true;
        let mut best_len = 0usize;

        for rule in &group.rules {
            if pattern_matches(&rule.pattern, path) {
                let len = rule.pattern.len();
                // Longer pattern wins; equal length ties go to allow
                if len > best_len || (len == best_len && rule.allow && !verdict) {
                    verdict = rule.allow;
                    best_len = len;
                }
            }
        }

        verdict
    }

    /// Declared crawl-delay for the matched group, if any.
    #[must_use]
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        self.group_for(user_agent)?.crawl_delay
    }

    #[must_use]
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }
}

/// Prefix match with `*` wildcards and an optional `$` end anchor.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    let p: Vec<u8> = pattern.bytes().collect();
    let s: Vec<u8> = path.bytes().collect();

    // Greedy wildcard match with backtracking, anchored at the start of
    // the path
    let (mut pi, mut si) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    loop {
        if pi < p.len() && p[pi] == b'*' {
            star = Some((pi, si));
            pi += 1;
        } else if pi < p.len() && si < s.len() && p[pi] == s[si] {
            pi += 1;
            si += 1;
        } else if let Some((star_pi, star_si)) = star
            && star_si < s.len()
        {
            // Widen the last wildcard by one byte and retry
            star = Some((star_pi, star_si + 1));
            pi = star_pi + 1;
            si = star_si + 1;
        } else {
            break;
        }
    }

    if pi < p.len() {
        return false;
    }
    if anchored { si == s.len() } else { true }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_disallow() {
        let rules = RobotsRules::parse("User-agent: testbot\nDisallow: /private");
        assert!(!rules.allowed("testbot/1.0", "/private"));
        assert!(!rules.allowed("testbot/1.0", "/private/page"));
        assert!(rules.allowed("testbot/1.0", "/public"));
    }

    #[test]
    fn user_agent_matching_is_case_insensitive() {
        let rules = RobotsRules::parse("User-agent: TestBot\nDisallow: /x");
        assert!(!rules.allowed("testbot", "/x"));
    }

    #[test]
    fn wildcard_group_is_fallback() {
        let rules = RobotsRules::parse(
            "User-agent: otherbot\nDisallow: /a\n\nUser-agent: *\nDisallow: /b",
        );
        assert!(rules.allowed("mybot", "/a"));
        assert!(!rules.allowed("mybot", "/b"));
    }

    #[test]
    fn longest_agent_token_wins() {
        let body = "User-agent: bot\nDisallow: /short\n\nUser-agent: mybot\nDisallow: /long";
        let rules = RobotsRules::parse(body);
        // "mybot" is the longer matching token, so only its group applies
        assert!(rules.allowed("mybot/2.0", "/short"));
        assert!(!rules.allowed("mybot/2.0", "/long"));
    }

    #[test]
    fn multiple_agents_share_a_group() {
        let body = "User-Agent: alphabot\nUser-Agent: betabot\nDisallow: /\n\nUser-Agent: *\nAllow: /";
        let rules = RobotsRules::parse(body);
        assert!(!rules.allowed("alphabot", "/anything"));
        assert!(!rules.allowed("betabot", "/anything"));
        assert!(rules.allowed("gammabot", "/anything"));
    }

    #[test]
    fn longest_match_wins_allow_over_disallow() {
        let body = "User-agent: *\nDisallow: /dir\nAllow: /dir/open";
        let rules = RobotsRules::parse(body);
        assert!(!rules.allowed("anybot", "/dir/closed"));
        assert!(rules.allowed("anybot", "/dir/open"));
        assert!(rules.allowed("anybot", "/dir/open/deeper"));
    }

    #[test]
    fn tie_goes_to_allow() {
        let body = "User-agent: *\nDisallow: /page\nAllow: /page";
        let rules = RobotsRules::parse(body);
        assert!(rules.allowed("anybot", "/page"));
    }

    #[test]
    fn empty_disallow_allows_everything() {
        let rules = RobotsRules::parse("User-agent: *\nDisallow:");
        assert!(rules.allowed("anybot", "/anything"));
    }

    #[test]
    fn wildcard_patterns() {
        let rules = RobotsRules::parse("User-agent: *\nDisallow: /test/*/secret");
        assert!(!rules.allowed("anybot", "/test/a/secret"));
        assert!(!rules.allowed("anybot", "/test/a/b/secret"));
        assert!(rules.allowed("anybot", "/test/a"));
    }

    #[test]
    fn dollar_anchors_to_end() {
        let rules = RobotsRules::parse("User-agent: *\nDisallow: /*.json$");
        assert!(!rules.allowed("anybot", "/data.json"));
        assert!(rules.allowed("anybot", "/data.jsonl"));
    }

    #[test]
    fn crawl_delay_parsed() {
        let body = "User-agent: slowbot\nCrawl-delay: 2.5\nDisallow: /x\n\nUser-agent: *\nDisallow:";
        let rules = RobotsRules::parse(body);
        assert_eq!(rules.crawl_delay("slowbot"), Some(Duration::from_secs_f64(2.5)));
        assert_eq!(rules.crawl_delay("otherbot"), None);
    }

    #[test]
    fn sitemaps_collected_case_insensitively() {
        let body = "User-agent: *\nDisallow: /x\nSitemap: http://a.test/sitemap.xml\nSiTeMaP: http://a.test/other.xml";
        let rules = RobotsRules::parse(body);
        assert_eq!(
            rules.sitemaps(),
            &["http://a.test/sitemap.xml", "http://a.test/other.xml"]
        );
    }

    #[test]
    fn comments_and_blank_lines_ignored() {
        let body = "# a comment\nUser-agent: * # trailing\n\nDisallow: /hidden # also trailing\n";
        let rules = RobotsRules::parse(body);
        assert!(!rules.allowed("anybot", "/hidden"));
        assert!(rules.allowed("anybot", "/visible"));
    }

    #[test]
    fn evaluation_is_pure() {
        let body = "User-agent: *\nDisallow: /a\nAllow: /a/b";
        let rules = RobotsRules::parse(body);
        for _ in 0..3 {
            assert!(!rules.allowed("bot", "/a/x"));
            assert!(rules.allowed("bot", "/a/b"));
        }
    }
}
