//! Near-duplicate title clustering for the grouped report layout.

use snaphound_core::Target;

/// A run of targets whose titles are close to the seed's title.
/// The seed is always `members[0]`.
#[derive(Debug)]
pub struct Cluster<'a> {
    pub members: Vec<&'a Target>,
}

impl<'a> Cluster<'a> {
    pub fn seed(&self) -> &'a Target {
        self.members[0]
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Normalized edit-distance similarity of two titles, in [0, 1].
///
/// Case and surrounding whitespace are ignored. Two empty titles are
/// identical.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.trim().to_lowercase().chars().collect();
    let b: Vec<char> = b.trim().to_lowercase().chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / longest as f64
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            cur[j + 1] = (prev[j + 1] + 1).min(cur[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// Group targets by title similarity to each cluster's seed.
///
/// Targets are ordered by `(title, url)`; each unvisited target opens a
/// cluster and absorbs every later unvisited target scoring at least
/// `threshold` against it. Every target lands in exactly one cluster and
/// clusters come out in seed order.
pub fn cluster<'a>(
    targets: impl IntoIterator<Item = &'a Target>,
    threshold: f64,
) -> Vec<Cluster<'a>> {
    let mut sorted: Vec<&Target> = targets.into_iter().collect();
    sorted.sort_by(|a, b| {
        a.sort_title()
            .cmp(b.sort_title())
            .then_with(|| a.url.cmp(&b.url))
            .then_with(|| a.index.cmp(&b.index))
    });

    let mut visited = vec![false; sorted.len()];
    let mut clusters = Vec::new();

    for i in 0..sorted.len() {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        let seed = sorted[i];
        let mut members = vec![seed];

        for j in (i + 1)..sorted.len() {
            if !visited[j] && title_similarity(seed.sort_title(), sorted[j].sort_title()) >= threshold {
                visited[j] = true;
                members.push(sorted[j]);
            }
        }
        clusters.push(Cluster { members });
    }
    clusters
}
