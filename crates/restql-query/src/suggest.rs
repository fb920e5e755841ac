//! Nearest-match suggestions for "Perhaps you meant" hints.

/// Pick the known name closest to `target`, if any is close enough to be a
/// plausible typo. Ties break alphabetically so hints are deterministic.
pub fn nearest<'a>(target: &str, known: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let mut best: Option<(usize, &str)> = None;
    for name in known {
        let d = levenshtein(target, name);
        match best {
            Some((bd, bn)) if (d, name) >= (bd, bn) => {}
            _ => best = Some((d, name)),
        }
    }
    // More than half the characters wrong is not a plausible typo.
    best.filter(|(d, _)| *d * 2 <= target.len().max(3))
        .map(|(_, name)| name)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_match() {
        let names = ["clients", "projects", "tasks"];
        assert_eq!(nearest("client", names.iter().copied()), Some("clients"));
        assert_eq!(nearest("taks", names.iter().copied()), Some("tasks"));
    }

    #[test]
    fn test_far_names_give_no_hint() {
        let names = ["clients", "projects"];
        assert_eq!(nearest("zzzzzzzz", names.iter().copied()), None);
    }

    #[test]
    fn test_tie_breaks_alphabetically() {
        let names = ["aa", "ab"];
        assert_eq!(nearest("ac", names.iter().copied()), Some("aa"));
    }
}
