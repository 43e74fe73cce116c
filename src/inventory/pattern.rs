//! Host range expansion: `web[01:03].example.com`, `db-[a:c]`, `node[1:9:2]`.

use regex_lite::Regex;
use std::sync::OnceLock;

/// Upper bound on the hosts a single pattern may expand to.
pub const MAX_EXPANDED_HOSTS: usize = 100_000;

fn range_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(.*?)\[([A-Za-z0-9]+):([A-Za-z0-9]+)(?::([0-9]+))?\](.*)$")
            .expect("static host range pattern")
    })
}

/// Expand every bracketed range in `pattern`. A pattern without ranges
/// expands to itself.
pub fn expand_hosts(pattern: &str) -> Result<Vec<String>, String> {
    let Some(caps) = range_regex().captures(pattern) else {
        return Ok(vec![pattern.to_string()]);
    };
    let head = &caps[1];
    let (start, end) = (&caps[2], &caps[3]);
    let stride = match caps.get(4) {
        Some(m) => m
            .as_str()
            .parse::<usize>()
            .map_err(|_| format!("invalid stride in {}", pattern))?,
        None => 1,
    };
    if stride == 0 {
        return Err(format!("stride must be positive in {}", pattern));
    }
    let tail = &caps[5];

    let items = if start.chars().all(|c| c.is_ascii_digit()) && end.chars().all(|c| c.is_ascii_digit())
    {
        numeric_range(start, end, stride, pattern)?
    } else if start.len() == 1
        && end.len() == 1
        && start.chars().all(|c| c.is_ascii_alphabetic())
        && end.chars().all(|c| c.is_ascii_alphabetic())
    {
        alpha_range(start, end, stride, pattern)?
    } else {
        return Err(format!("invalid host range {}", pattern));
    };

    // The tail may hold further ranges.
    let rests = expand_hosts(tail)?;
    if items.len().saturating_mul(rests.len()) > MAX_EXPANDED_HOSTS {
        return Err(too_many(pattern));
    }
    let mut hosts = Vec::with_capacity(items.len() * rests.len());
    for item in &items {
        for rest in &rests {
            hosts.push(format!("{}{}{}", head, item, rest));
        }
    }
    Ok(hosts)
}

fn numeric_range(start: &str, end: &str, stride: usize, pattern: &str) -> Result<Vec<String>, String> {
    let from: u64 = start.parse().map_err(|_| format!("invalid range start in {}", pattern))?;
    let to: u64 = end.parse().map_err(|_| format!("invalid range end in {}", pattern))?;
    if from > to {
        return Err(format!("range start exceeds end in {}", pattern));
    }
    if (to - from) / stride as u64 >= MAX_EXPANDED_HOSTS as u64 {
        return Err(too_many(pattern));
    }
    let width = if start.len() > 1 && start.starts_with('0') {
        start.len()
    } else {
        0
    };
    Ok((from..=to)
        .step_by(stride)
        .map(|n| format!("{:0width$}", n, width = width))
        .collect())
}

fn too_many(pattern: &str) -> String {
    format!(
        "host range {} expands to more than {} hosts",
        pattern, MAX_EXPANDED_HOSTS
    )
}

fn alpha_range(start: &str, end: &str, stride: usize, pattern: &str) -> Result<Vec<String>, String> {
    let from = start.as_bytes()[0];
    let to = end.as_bytes()[0];
    if from > to {
        return Err(format!("range start exceeds end in {}", pattern));
    }
    Ok((from..=to)
        .step_by(stride)
        .map(|b| (b as char).to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_pass_through() {
        assert_eq!(expand_hosts("db.example.com").unwrap(), vec!["db.example.com"]);
    }

    #[test]
    fn numeric_ranges_keep_padding() {
        assert_eq!(
            expand_hosts("web[01:03].example.com").unwrap(),
            vec!["web01.example.com", "web02.example.com", "web03.example.com"]
        );
        assert_eq!(expand_hosts("n[1:5:2]").unwrap(), vec!["n1", "n3", "n5"]);
    }

    #[test]
    fn alpha_and_nested_ranges() {
        assert_eq!(expand_hosts("db-[a:c]").unwrap(), vec!["db-a", "db-b", "db-c"]);
        assert_eq!(
            expand_hosts("r[1:2]-[a:b]").unwrap(),
            vec!["r1-a", "r1-b", "r2-a", "r2-b"]
        );
    }

    #[test]
    fn reversed_range_is_an_error() {
        assert!(expand_hosts("web[5:1]").is_err());
        assert!(expand_hosts("web[1:3:0]").is_err());
    }

    #[test]
    fn oversized_ranges_are_rejected() {
        let err = expand_hosts("h[0:999999999]").unwrap_err();
        assert!(err.contains("more than"), "{}", err);
        // Each range alone fits, the product does not.
        assert!(expand_hosts("h[0:999]-[0:999]").is_err());
        assert_eq!(expand_hosts("h[0:99999]").unwrap().len(), MAX_EXPANDED_HOSTS);
        assert_eq!(expand_hosts("h[0:999999999:10000]").unwrap().len(), MAX_EXPANDED_HOSTS);
    }
}
