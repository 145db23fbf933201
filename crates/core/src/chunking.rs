#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub min_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 1_200,
            overlap_chars: 120,
            min_chars: 120,
        }
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Packs blank-line separated paragraphs into passages of at most `max_chars`
/// characters. Oversized paragraphs are split with `overlap_chars` of overlap.
pub fn chunk_by_paragraph(text: &str, config: ChunkingConfig) -> Vec<String> {
    let paragraphs = text
        .split("\n\n")
        .map(normalize_whitespace)
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>();

    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in paragraphs {
        if current.is_empty() {
            current.push_str(&paragraph);
            continue;
        }

        if char_len(&current) + char_len(&paragraph) + 2 <= config.max_chars {
            current.push_str("\n\n");
            current.push_str(&paragraph);
        } else {
            if char_len(&current) >= config.min_chars {
                chunks.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
            current.push_str(&paragraph);
        }
    }

    if char_len(&current) >= config.min_chars {
        chunks.push(current);
    }

    if chunks.is_empty() {
        let whole = normalize_whitespace(text);
        if !whole.is_empty() {
            chunks.push(whole);
        }
    }

    let mut with_overlap = Vec::new();
    for chunk in chunks {
        if char_len(&chunk) <= config.max_chars {
            with_overlap.push(chunk);
            continue;
        }

        let chars: Vec<char> = chunk.chars().collect();
        let step = config.max_chars.saturating_sub(config.overlap_chars).max(1);
        let mut start = 0;
        while start < chars.len() {
            let end = (start + config.max_chars).min(chars.len());
            with_overlap.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }
    }

    with_overlap
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
