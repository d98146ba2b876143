use lazy_static::lazy_static;
use regex::Regex;
use std::cmp::Ordering;

/// Orders strings the way a page list should be ordered. Runs of digits are
/// compared by numeric value, everything else character by character, hence
/// "page2.png" comes before "page10.png".
pub fn natural_cmp(s1: &str, s2: &str) -> Ordering {
    lazy_static! {
        static ref RE: Regex = Regex::new(r"^\d+").unwrap();
    }
    let (mut r1, mut r2) = (s1, s2);
    loop {
        match (r1.is_empty(), r2.is_empty()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => (),
        }
        if let (Some(m1), Some(m2)) = (RE.find(r1), RE.find(r2)) {
            let n1 = m1.as_str().parse::<u128>();
            let n2 = m2.as_str().parse::<u128>();
            match (n1, n2) {
                (Ok(n1), Ok(n2)) => {
                    if n1 != n2 {
                        return n1.cmp(&n2);
                    }
                }
                _ => {
                    // digit runs too long even for u128, compare as text
                    if m1.as_str() != m2.as_str() {
                        return m1.as_str().cmp(m2.as_str());
                    }
                }
            }
            r1 = &r1[m1.end()..];
            r2 = &r2[m2.end()..];
        } else {
            let c1 = r1.chars().next();
            let c2 = r2.chars().next();
            if let (Some(c1), Some(c2)) = (c1, c2) {
                if c1 != c2 {
                    return c1.cmp(&c2);
                }
                r1 = &r1[c1.len_utf8()..];
                r2 = &r2[c2.len_utf8()..];
            } else {
                return Ordering::Equal;
            }
        }
    }
}

#[test]
fn test_natural_sort() {
    assert_eq!(natural_cmp("s10", "s2"), Ordering::Greater);
    assert_eq!(natural_cmp("10s", "s2"), Ordering::Less);
    assert_eq!(natural_cmp("10", "2"), Ordering::Greater);
    assert_eq!(natural_cmp("10.0", "10.0"), Ordering::Equal);
    assert_eq!(natural_cmp("20.0", "10.0"), Ordering::Greater);
    assert_eq!(natural_cmp("page2.png", "page10.png"), Ordering::Less);
    assert_eq!(natural_cmp("page", "page2.png"), Ordering::Less);
    assert_eq!(
        natural_cmp("a lot of text 20.0 .", "a lot of text 100.0"),
        Ordering::Less
    );
    assert_eq!(
        natural_cmp("a lot of 7text 20.0 .", "a lot of 3text 100.0"),
        Ordering::Greater
    );
    let mut names = vec!["page10.png", "page1.png", "cover.png", "page2.png"];
    names.sort_by(|n1, n2| natural_cmp(n1, n2));
    assert_eq!(
        names,
        vec!["cover.png", "page1.png", "page2.png", "page10.png"]
    );
}
