//! Maven-style version ordering.

use std::cmp::Ordering;

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Number(u64),
    Qualifier(&'a str),
}

fn segments(version: &str) -> Vec<Segment<'_>> {
    version
        .split(['.', '-'])
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse() {
            Ok(n) => Segment::Number(n),
            Err(_) => Segment::Qualifier(s),
        })
        .collect()
}

/// Compare two versions segment by segment.
///
/// Numeric segments compare numerically and rank above qualifiers, so
/// `1.10 > 1.9` and `1.0 > 1.0-SNAPSHOT`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a = segments(a);
    let b = segments(b);

    for (x, y) in a.iter().zip(&b) {
        let ordering = match (x, y) {
            (Segment::Number(x), Segment::Number(y)) => x.cmp(y),
            (Segment::Number(_), Segment::Qualifier(_)) => Ordering::Greater,
            (Segment::Qualifier(_), Segment::Number(_)) => Ordering::Less,
            (Segment::Qualifier(x), Segment::Qualifier(y)) => {
                x.to_ascii_lowercase().cmp(&y.to_ascii_lowercase())
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    // A longer version wins on an extra number and loses on an extra qualifier
    match a.len().cmp(&b.len()) {
        Ordering::Equal => Ordering::Equal,
        Ordering::Greater => match a[b.len()] {
            Segment::Number(_) => Ordering::Greater,
            Segment::Qualifier(_) => Ordering::Less,
        },
        Ordering::Less => match b[a.len()] {
            Segment::Number(_) => Ordering::Less,
            Segment::Qualifier(_) => Ordering::Greater,
        },
    }
}

/// Highest version among `versions`.
pub fn latest_version<'a>(versions: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    versions.into_iter().max_by(|a, b| compare_versions(a, b))
}
