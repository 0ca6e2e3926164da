//! A small pattern-satisfying string sampler.
//!
//! The data generator needs strings that satisfy the `pattern` constraint of
//! a schema, and falls back to `{prefix}\d+` when none is given. The
//! patterns that actually occur in OpenAPI documents use a narrow slice of
//! regex syntax, so this module samples from that slice directly: literals,
//! `.`/`\d`/`\w`/`\s`, character classes with ranges, groups, alternation
//! and the `?`/`*`/`+`/`{m,n}` quantifiers (lazy variants accepted and
//! treated as greedy — a sample either way). Anchors are ignored.

use apiprobe_error::{ProbeError, Result};
use rand::Rng;

#[derive(Debug, Clone)]
enum Node {
    Literal(char),
    /// Any character: sampled from the ASCII alphanumerics.
    Any,
    /// Inclusive character ranges; single characters are `(c, c)`.
    Class(Vec<(char, char)>),
    /// Alternation of concatenations.
    Group(Vec<Vec<Node>>),
    Repeat {
        node: Box<Node>,
        min: usize,
        /// `None` is an unbounded repeat, capped by the sampler's limit.
        max: Option<usize>,
    },
}

struct Parser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    pattern: &'a str,
}

impl<'a> Parser<'a> {
    fn new(pattern: &'a str) -> Self {
        Self {
            chars: pattern.chars().peekable(),
            pattern,
        }
    }

    fn error(&self, detail: &str) -> ProbeError {
        ProbeError::UnknownFormat {
            format: format!("pattern '{}': {detail}", self.pattern),
        }
    }

    fn parse_alternation(&mut self) -> Result<Vec<Vec<Node>>> {
        let mut branches = vec![self.parse_concat()?];
        while self.chars.peek() == Some(&'|') {
            self.chars.next();
            branches.push(self.parse_concat()?);
        }
        Ok(branches)
    }

    fn parse_concat(&mut self) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        while let Some(&c) = self.chars.peek() {
            if c == '|' || c == ')' {
                break;
            }
            self.chars.next();
            let atom = match c {
                '^' | '$' => continue,
                '(' => {
                    let inner = self.parse_alternation()?;
                    if self.chars.next() != Some(')') {
                        return Err(self.error("unterminated group"));
                    }
                    Node::Group(inner)
                }
                '[' => self.parse_class()?,
                '.' => Node::Any,
                '\\' => self.parse_escape()?,
                '?' | '*' | '+' | '{' => return Err(self.error("dangling quantifier")),
                other => Node::Literal(other),
            };
            nodes.push(self.parse_quantifier(atom)?);
        }
        Ok(nodes)
    }

    fn parse_escape(&mut self) -> Result<Node> {
        let c = self
            .chars
            .next()
            .ok_or_else(|| self.error("trailing backslash"))?;
        Ok(match c {
            'd' => Node::Class(vec![('0', '9')]),
            'w' => Node::Class(vec![('a', 'z'), ('A', 'Z'), ('0', '9'), ('_', '_')]),
            's' => Node::Literal(' '),
            other => Node::Literal(other),
        })
    }

    fn parse_class(&mut self) -> Result<Node> {
        if self.chars.peek() == Some(&'^') {
            return Err(self.error("negated classes are not supported"));
        }
        let mut ranges = Vec::new();
        loop {
            let c = self
                .chars
                .next()
                .ok_or_else(|| self.error("unterminated class"))?;
            match c {
                ']' => break,
                '\\' => match self.parse_escape()? {
                    Node::Class(mut r) => ranges.append(&mut r),
                    Node::Literal(l) => ranges.push((l, l)),
                    _ => return Err(self.error("unsupported escape in class")),
                },
                lo => {
                    if self.chars.peek() == Some(&'-') {
                        self.chars.next();
                        match self.chars.peek() {
                            Some(&']') | None => {
                                // Trailing dash is a literal.
                                ranges.push((lo, lo));
                                ranges.push(('-', '-'));
                            }
                            Some(&hi) => {
                                self.chars.next();
                                if hi < lo {
                                    return Err(self.error("inverted range"));
                                }
                                ranges.push((lo, hi));
                            }
                        }
                    } else {
                        ranges.push((lo, lo));
                    }
                }
            }
        }
        if ranges.is_empty() {
            return Err(self.error("empty class"));
        }
        Ok(Node::Class(ranges))
    }

    fn parse_quantifier(&mut self, node: Node) -> Result<Node> {
        let (min, max) = match self.chars.peek() {
            Some('?') => (0, Some(1)),
            Some('*') => (0, None),
            Some('+') => (1, None),
            Some('{') => {
                self.chars.next();
                let mut first = String::new();
                let mut second: Option<String> = None;
                loop {
                    match self.chars.next() {
                        Some('}') => break,
                        Some(',') => second = Some(String::new()),
                        Some(d) if d.is_ascii_digit() => match second.as_mut() {
                            Some(s) => s.push(d),
                            None => first.push(d),
                        },
                        _ => return Err(self.error("malformed repetition count")),
                    }
                }
                let min: usize = first
                    .parse()
                    .map_err(|_| self.error("malformed repetition count"))?;
                let max = match second {
                    None => Some(min),
                    Some(s) if s.is_empty() => None,
                    Some(s) => Some(
                        s.parse()
                            .map_err(|_| self.error("malformed repetition count"))?,
                    ),
                };
                self.eat_lazy_marker();
                return Ok(Node::Repeat {
                    node: Box::new(node),
                    min,
                    max,
                });
            }
            _ => return Ok(node),
        };
        self.chars.next();
        self.eat_lazy_marker();
        Ok(Node::Repeat {
            node: Box::new(node),
            min,
            max,
        })
    }

    fn eat_lazy_marker(&mut self) {
        if self.chars.peek() == Some(&'?') {
            self.chars.next();
        }
    }
}

fn sample_node(node: &Node, limit: usize, rng: &mut impl Rng, out: &mut String) {
    match node {
        Node::Literal(c) => out.push(*c),
        Node::Any => {
            const ALNUM: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
            out.push(ALNUM[rng.gen_range(0..ALNUM.len())] as char);
        }
        Node::Class(ranges) => {
            let total: u32 = ranges
                .iter()
                .map(|(lo, hi)| *hi as u32 - *lo as u32 + 1)
                .sum();
            let mut pick = rng.gen_range(0..total);
            for (lo, hi) in ranges {
                let span = *hi as u32 - *lo as u32 + 1;
                if pick < span {
                    out.push(char::from_u32(*lo as u32 + pick).unwrap_or(*lo));
                    return;
                }
                pick -= span;
            }
        }
        Node::Group(branches) => {
            let branch = &branches[rng.gen_range(0..branches.len())];
            for n in branch {
                sample_node(n, limit, rng, out);
            }
        }
        Node::Repeat { node, min, max } => {
            let hi = max.unwrap_or_else(|| (*min).max(limit));
            let count = if hi <= *min {
                *min
            } else {
                rng.gen_range(*min..=hi)
            };
            for _ in 0..count {
                sample_node(node, limit, rng, out);
            }
        }
    }
}

/// Produce a string matching `pattern`. `limit` caps unbounded repeats.
pub fn sample_pattern(pattern: &str, limit: usize, rng: &mut impl Rng) -> Result<String> {
    let mut parser = Parser::new(pattern);
    let branches = parser.parse_alternation()?;
    if parser.chars.next().is_some() {
        return Err(parser.error("unbalanced parenthesis"));
    }
    let node = Node::Group(branches);
    let mut out = String::new();
    sample_node(&node, limit.max(1), rng, &mut out);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(7)
    }

    #[test]
    fn digits() {
        let mut r = rng();
        for _ in 0..20 {
            let s = sample_pattern(r"pet\d+", 5, &mut r).unwrap();
            assert!(s.starts_with("pet"));
            let tail = &s[3..];
            assert!(!tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()), "{s}");
        }
    }

    #[test]
    fn email_pattern() {
        let mut r = rng();
        for _ in 0..20 {
            let s = sample_pattern(r"^\w+@[a-zA-Z_]+?\.[a-zA-Z]{2,3}$", 6, &mut r).unwrap();
            let (local, rest) = s.split_once('@').expect("has @");
            let (domain, tld) = rest.rsplit_once('.').expect("has dot");
            assert!(!local.is_empty());
            assert!(!domain.is_empty());
            assert!(tld.len() >= 2 && tld.len() <= 3, "{s}");
        }
    }

    #[test]
    fn alternation_and_groups() {
        let mut r = rng();
        for _ in 0..20 {
            let s = sample_pattern("(cat|dog)-[0-9]{2}", 4, &mut r).unwrap();
            assert!(s.starts_with("cat-") || s.starts_with("dog-"), "{s}");
            assert_eq!(s.len(), 6);
        }
    }

    #[test]
    fn bounded_repeats() {
        let mut r = rng();
        for _ in 0..20 {
            let s = sample_pattern("a{3}b?", 4, &mut r).unwrap();
            assert!(s == "aaa" || s == "aaab");
        }
    }

    #[test]
    fn rejects_unsupported() {
        let mut r = rng();
        assert!(sample_pattern("[^a]", 4, &mut r).is_err());
        assert!(sample_pattern("(unclosed", 4, &mut r).is_err());
        assert!(sample_pattern("*dangling", 4, &mut r).is_err());
    }

    #[test]
    fn class_with_escape_and_dash() {
        let mut r = rng();
        for _ in 0..20 {
            let s = sample_pattern(r"[\da-f-]", 4, &mut r).unwrap();
            let c = s.chars().next().unwrap();
            assert!(c.is_ascii_hexdigit() || c == '-', "{s}");
        }
    }
}
