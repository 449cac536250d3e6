//! Unified-diff generation between two raw manifest dumps
//!
//! Classical LCS line diff with `@@` chunk headers. Chunks are flushed when
//! they grow past [`MAX_CHUNK_LINES`] so a mostly-rewritten dump still
//! renders as a sequence of bounded hunks. Line numbers are 1-based.
//!
//! The DP table is O(m*n) in the two line counts; manifest dumps are a few
//! thousand lines, which keeps this comfortably small.

/// Diff body lines accumulated before a chunk is flushed.
const MAX_CHUNK_LINES: usize = 50;

/// Produce a unified diff of `old_text` against `new_text`.
///
/// An empty `old_text` produces the all-addition form with a `/dev/null`
/// header. Two empty inputs produce an empty string.
pub fn generate_unified_diff(
    old_text: &str,
    new_text: &str,
    old_label: &str,
    new_label: &str,
) -> String {
    if old_text.is_empty() && new_text.is_empty() {
        return String::new();
    }

    if old_text.is_empty() {
        return format_as_addition(new_text);
    }

    let old_lines: Vec<&str> = old_text.split('\n').collect();
    let new_lines: Vec<&str> = new_text.split('\n').collect();

    let mut result = format!("--- {old_label}\n+++ {new_label}\n");
    for chunk in diff_chunks(&old_lines, &new_lines) {
        result.push_str(&chunk);
    }

    result
}

struct ChunkState {
    body: String,
    old_start: usize,
    new_start: usize,
    old_count: usize,
    new_count: usize,
    has_changes: bool,
}

impl ChunkState {
    fn new() -> Self {
        Self {
            body: String::new(),
            old_start: 1,
            new_start: 1,
            old_count: 0,
            new_count: 0,
            has_changes: false,
        }
    }

    fn open_at(&mut self, old_idx: usize, new_idx: usize) {
        if !self.has_changes {
            self.old_start = old_idx + 1;
            self.new_start = new_idx + 1;
            self.has_changes = true;
        }
    }

    fn flush_into(&mut self, chunks: &mut Vec<String>) {
        if self.has_changes {
            let header = format!(
                "@@ -{},{} +{},{} @@\n",
                self.old_start, self.old_count, self.new_start, self.new_count
            );
            chunks.push(header + &self.body);
        }
        self.body.clear();
        self.has_changes = false;
        self.old_count = 0;
        self.new_count = 0;
    }
}

fn diff_chunks(old_lines: &[&str], new_lines: &[&str]) -> Vec<String> {
    let lcs = compute_lcs(old_lines, new_lines);

    let mut chunks = Vec::new();
    let mut state = ChunkState::new();

    let (mut old_idx, mut new_idx, mut lcs_idx) = (0usize, 0usize, 0usize);

    while old_idx < old_lines.len() || new_idx < new_lines.len() {
        let on_common = lcs_idx < lcs.len()
            && old_idx < old_lines.len()
            && new_idx < new_lines.len()
            && old_lines[old_idx] == lcs[lcs_idx]
            && new_lines[new_idx] == lcs[lcs_idx];

        if on_common {
            // Context lines only appear inside an open chunk.
            if state.has_changes {
                state.body.push(' ');
                state.body.push_str(old_lines[old_idx]);
                state.body.push('\n');
                state.old_count += 1;
                state.new_count += 1;
            }
            old_idx += 1;
            new_idx += 1;
            lcs_idx += 1;
        } else if old_idx < old_lines.len()
            && (lcs_idx >= lcs.len() || old_lines[old_idx] != lcs[lcs_idx])
        {
            state.open_at(old_idx, new_idx);
            state.body.push('-');
            state.body.push_str(old_lines[old_idx]);
            state.body.push('\n');
            state.old_count += 1;
            old_idx += 1;
        } else if new_idx < new_lines.len()
            && (lcs_idx >= lcs.len() || new_lines[new_idx] != lcs[lcs_idx])
        {
            state.open_at(old_idx, new_idx);
            state.body.push('+');
            state.body.push_str(new_lines[new_idx]);
            state.body.push('\n');
            state.new_count += 1;
            new_idx += 1;
        }

        if state.old_count + state.new_count > MAX_CHUNK_LINES {
            state.flush_into(&mut chunks);
        }
    }

    state.flush_into(&mut chunks);
    chunks
}

/// Longest common subsequence of two line slices via the standard DP table.
fn compute_lcs<'a>(a: &[&'a str], b: &[&'a str]) -> Vec<&'a str> {
    let (m, n) = (a.len(), b.len());
    let mut dp = vec![vec![0usize; n + 1]; m + 1];

    for i in 1..=m {
        for j in 1..=n {
            dp[i][j] = if a[i - 1] == b[j - 1] {
                dp[i - 1][j - 1] + 1
            } else {
                dp[i - 1][j].max(dp[i][j - 1])
            };
        }
    }

    let mut lcs = Vec::with_capacity(dp[m][n]);
    let (mut i, mut j) = (m, n);
    while i > 0 && j > 0 {
        if a[i - 1] == b[j - 1] {
            lcs.push(a[i - 1]);
            i -= 1;
            j -= 1;
        } else if dp[i - 1][j] > dp[i][j - 1] {
            i -= 1;
        } else {
            j -= 1;
        }
    }
    lcs.reverse();
    lcs
}

fn format_as_addition(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut result = format!("--- /dev/null\n+++ new\n@@ -0,0 +1,{} @@\n", lines.len());
    for line in lines {
        result.push('+');
        result.push_str(line);
        result.push('\n');
    }
    result
}
