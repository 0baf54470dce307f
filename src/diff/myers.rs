//! Myers' O(ND) shortest edit script.
//!
//! Used for both line-level diffs of page content and word-level diffs
//! inside replaced lines. Common prefixes and suffixes are stripped before
//! the search, and the search gives up past [`MAX_EDIT_COST`] edits, at
//! which point the remaining middle section is reported as a full
//! replacement.

/// One step of an edit script, as indices into the compared sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    /// `old[old] == new[new]`.
    Equal {
        /// Index into the old sequence.
        old: usize,
        /// Index into the new sequence.
        new: usize,
    },
    /// `old[old]` is not present in the new sequence.
    Delete {
        /// Index into the old sequence.
        old: usize,
    },
    /// `new[new]` is not present in the old sequence.
    Insert {
        /// Index into the new sequence.
        new: usize,
    },
}

/// Edit distance above which the search stops.
const MAX_EDIT_COST: usize = 1_000;

/// Computes a shortest edit script turning `old` into `new`.
///
/// Edits are ordered by position: every `Equal` and `Delete` advances the
/// old index by one, every `Equal` and `Insert` advances the new index.
#[must_use]
pub fn edit_script<T: PartialEq>(old: &[T], new: &[T]) -> Vec<Edit> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let old_rest = old.get(prefix..).unwrap_or_default();
    let new_rest = new.get(prefix..).unwrap_or_default();

    let suffix = old_rest
        .iter()
        .rev()
        .zip(new_rest.iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let old_mid = old_rest
        .get(..old_rest.len() - suffix)
        .unwrap_or_default();
    let new_mid = new_rest
        .get(..new_rest.len() - suffix)
        .unwrap_or_default();

    let mut edits = Vec::with_capacity(old.len().max(new.len()));
    edits.extend((0..prefix).map(|i| Edit::Equal { old: i, new: i }));
    edits.extend(
        shortest_edit(old_mid, new_mid)
            .into_iter()
            .map(|edit| match edit {
                Edit::Equal { old, new } => Edit::Equal {
                    old: old + prefix,
                    new: new + prefix,
                },
                Edit::Delete { old } => Edit::Delete { old: old + prefix },
                Edit::Insert { new } => Edit::Insert { new: new + prefix },
            }),
    );
    let old_tail = prefix + old_mid.len();
    let new_tail = prefix + new_mid.len();
    edits.extend((0..suffix).map(|i| Edit::Equal {
        old: old_tail + i,
        new: new_tail + i,
    }));
    edits
}

/// Replacement script used for empty sides and when the search gives up.
fn replace_all(n: usize, m: usize) -> Vec<Edit> {
    (0..n)
        .map(|old| Edit::Delete { old })
        .chain((0..m).map(|new| Edit::Insert { new }))
        .collect()
}

#[allow(
    clippy::indexing_slicing,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]
fn shortest_edit<T: PartialEq>(a: &[T], b: &[T]) -> Vec<Edit> {
    let (n, m) = (a.len(), b.len());
    if n == 0 || m == 0 {
        return replace_all(n, m);
    }

    let max_d = (n + m).min(MAX_EDIT_COST);
    let offset = max_d as isize + 1;
    // v[k + offset] holds the furthest x reached on diagonal k.
    let mut v = vec![0usize; 2 * max_d + 3];
    // trace[d] keeps diagonals -d..=d as they stood after round d.
    let mut trace: Vec<Vec<usize>> = Vec::new();

    for d in 0..=max_d as isize {
        let mut k = -d;
        while k <= d {
            let idx = (k + offset) as usize;
            let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = (x as isize - k) as usize;
            while x < n && y < m && a[x] == b[y] {
                x += 1;
                y += 1;
            }
            v[idx] = x;
            if x >= n && y >= m {
                return backtrack(&trace, n, m);
            }
            k += 2;
        }
        trace.push(v[(offset - d) as usize..=(offset + d) as usize].to_vec());
    }

    tracing::debug!(old = n, new = m, "edit distance above search bound");
    replace_all(n, m)
}

/// Walks back from `(n, m)`. `trace` holds every completed round before the
/// one that reached the end.
#[allow(
    clippy::indexing_slicing,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]
fn backtrack(trace: &[Vec<usize>], n: usize, m: usize) -> Vec<Edit> {
    let mut edits = Vec::with_capacity(n.max(m));
    let (mut x, mut y) = (n as isize, m as isize);

    for d in (1..=trace.len() as isize).rev() {
        let prev = &trace[(d - 1) as usize];
        let at = |k: isize| prev[(k + d - 1) as usize] as isize;
        let k = x - y;
        let prev_k = if k == -d || (k != d && at(k - 1) < at(k + 1)) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = at(prev_k);
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            edits.push(Edit::Equal {
                old: (x - 1) as usize,
                new: (y - 1) as usize,
            });
            x -= 1;
            y -= 1;
        }
        if x == prev_x {
            edits.push(Edit::Insert {
                new: (y - 1) as usize,
            });
        } else {
            edits.push(Edit::Delete {
                old: (x - 1) as usize,
            });
        }
        x = prev_x;
        y = prev_y;
    }
    while x > 0 && y > 0 {
        edits.push(Edit::Equal {
            old: (x - 1) as usize,
            new: (y - 1) as usize,
        });
        x -= 1;
        y -= 1;
    }

    edits.reverse();
    edits
}
