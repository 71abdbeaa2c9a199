use similar::{Algorithm, ChangeTag, TextDiff};

use super::DIFF_DEADLINE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ChunkTag {
    Equal,
    Insert,
    Delete,
}

impl From<ChangeTag> for ChunkTag {
    fn from(tag: ChangeTag) -> Self {
        match tag {
            ChangeTag::Equal => Self::Equal,
            ChangeTag::Insert => Self::Insert,
            ChangeTag::Delete => Self::Delete,
        }
    }
}

/// A run of characters sharing one diff operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Chunk {
    pub tag: ChunkTag,
    pub text: Vec<char>,
}

impl Chunk {
    pub fn new(tag: ChunkTag, text: &str) -> Self {
        Self {
            tag,
            text: text.chars().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }
}

/// Character-level Myers diff, coalesced into runs with every deletion
/// ordered before the insertion it pairs with.
pub(super) fn char_chunks(before: &str, after: &str) -> Vec<Chunk> {
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .timeout(DIFF_DEADLINE)
        .diff_chars(before, after);

    let mut chunks: Vec<Chunk> = Vec::new();
    for change in diff.iter_all_changes() {
        let tag = ChunkTag::from(change.tag());
        match chunks.last_mut() {
            Some(last) if last.tag == tag => last.text.extend(change.value().chars()),
            _ => chunks.push(Chunk::new(tag, change.value())),
        }
    }

    cleanup_merge(&mut chunks);
    chunks
}

/// Folds equalities that are no longer than the edits on both sides of them
/// into those edits, so that a word rewritten letter by letter reads as one
/// deletion and one insertion.
pub(super) fn cleanup_semantic(mut chunks: Vec<Chunk>) -> Vec<Chunk> {
    let mut changed = false;
    let mut equalities: Vec<usize> = Vec::new();
    let mut last_equality: Option<usize> = None;
    let (mut inserted_before, mut deleted_before) = (0_usize, 0_usize);
    let (mut inserted_after, mut deleted_after) = (0_usize, 0_usize);

    let mut pointer = 0_isize;
    while (pointer as usize) < chunks.len() {
        let index = pointer as usize;
        if chunks[index].tag == ChunkTag::Equal {
            equalities.push(index);
            inserted_before = inserted_after;
            deleted_before = deleted_after;
            inserted_after = 0;
            deleted_after = 0;
            last_equality = Some(index);
        } else {
            if chunks[index].tag == ChunkTag::Insert {
                inserted_after += chunks[index].len();
            } else {
                deleted_after += chunks[index].len();
            }

            let collapsible = last_equality.is_some_and(|equality| {
                let length = chunks[equality].len();
                length <= inserted_before.max(deleted_before)
                    && length <= inserted_after.max(deleted_after)
            });

            let target = if collapsible { equalities.pop() } else { None };
            if let Some(equality) = target {
                let text = chunks[equality].text.clone();
                chunks.insert(
                    equality,
                    Chunk {
                        tag: ChunkTag::Delete,
                        text,
                    },
                );
                chunks[equality + 1].tag = ChunkTag::Insert;

                // the preceding equality has to be evaluated again
                equalities.pop();
                pointer = equalities.last().map_or(-1, |&previous| previous as isize);
                inserted_before = 0;
                deleted_before = 0;
                inserted_after = 0;
                deleted_after = 0;
                last_equality = None;
                changed = true;
            }
        }
        pointer += 1;
    }

    if changed {
        cleanup_merge(&mut chunks);
    }
    chunks.retain(|chunk| !chunk.text.is_empty());
    chunks
}

/// Merges neighbouring runs of the same kind and moves text shared by a
/// deletion and an insertion out into the surrounding equalities.
pub(super) fn cleanup_merge(chunks: &mut Vec<Chunk>) {
    chunks.push(Chunk {
        tag: ChunkTag::Equal,
        text: Vec::new(),
    });

    let mut pointer = 0_usize;
    let (mut count_delete, mut count_insert) = (0_usize, 0_usize);
    let mut text_delete: Vec<char> = Vec::new();
    let mut text_insert: Vec<char> = Vec::new();

    while pointer < chunks.len() {
        match chunks[pointer].tag {
            ChunkTag::Insert => {
                count_insert += 1;
                text_insert.extend_from_slice(&chunks[pointer].text);
                pointer += 1;
            }
            ChunkTag::Delete => {
                count_delete += 1;
                text_delete.extend_from_slice(&chunks[pointer].text);
                pointer += 1;
            }
            ChunkTag::Equal => {
                if count_delete + count_insert > 1 {
                    let mut first = pointer - count_delete - count_insert;
                    if count_delete != 0 && count_insert != 0 {
                        let prefix = common_prefix(&text_insert, &text_delete);
                        if prefix != 0 {
                            if first > 0 && chunks[first - 1].tag == ChunkTag::Equal {
                                chunks[first - 1]
                                    .text
                                    .extend_from_slice(&text_insert[..prefix]);
                            } else {
                                chunks.insert(
                                    0,
                                    Chunk {
                                        tag: ChunkTag::Equal,
                                        text: text_insert[..prefix].to_vec(),
                                    },
                                );
                                first += 1;
                                pointer += 1;
                            }
                            text_insert.drain(..prefix);
                            text_delete.drain(..prefix);
                        }

                        let suffix = common_suffix(&text_insert, &text_delete);
                        if suffix != 0 {
                            let shared = text_insert[text_insert.len() - suffix..].to_vec();
                            chunks[pointer].text.splice(0..0, shared);
                            text_insert.truncate(text_insert.len() - suffix);
                            text_delete.truncate(text_delete.len() - suffix);
                        }
                    }

                    let mut merged = Vec::with_capacity(2);
                    if !text_delete.is_empty() {
                        merged.push(Chunk {
                            tag: ChunkTag::Delete,
                            text: std::mem::take(&mut text_delete),
                        });
                    }
                    if !text_insert.is_empty() {
                        merged.push(Chunk {
                            tag: ChunkTag::Insert,
                            text: std::mem::take(&mut text_insert),
                        });
                    }
                    let merged_len = merged.len();
                    chunks.splice(first..pointer, merged);
                    pointer = first + merged_len + 1;
                } else if pointer != 0 && chunks[pointer - 1].tag == ChunkTag::Equal {
                    let text = chunks.remove(pointer).text;
                    chunks[pointer - 1].text.extend(text);
                } else {
                    pointer += 1;
                }

                count_delete = 0;
                count_insert = 0;
                text_delete.clear();
                text_insert.clear();
            }
        }
    }

    if chunks.last().is_some_and(|chunk| chunk.text.is_empty()) {
        chunks.pop();
    }
}

fn common_prefix(left: &[char], right: &[char]) -> usize {
    left.iter()
        .zip(right.iter())
        .take_while(|(l, r)| l == r)
        .count()
}

fn common_suffix(left: &[char], right: &[char]) -> usize {
    left.iter()
        .rev()
        .zip(right.iter().rev())
        .take_while(|(l, r)| l == r)
        .count()
}
