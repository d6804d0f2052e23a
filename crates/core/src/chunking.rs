use crate::embeddings::TokenCounter;
use crate::error::IngestError;
use crate::models::IngestionOptions;
use regex::Regex;

/// A sentence ends at `.`, `!`, or `?` followed by whitespace.
const SENTENCE_BOUNDARY: &str = r"[.!?]\s+";

/// Splits text into sentences on terminal punctuation. A trailing run with no
/// terminal punctuation is kept as a final sentence.
pub fn split_sentences(text: &str) -> Result<Vec<String>, IngestError> {
    let boundary = Regex::new(SENTENCE_BOUNDARY)?;

    let mut sentences = Vec::new();
    let mut cursor = 0usize;

    for found in boundary.find_iter(text) {
        // the match starts on the punctuation byte; the sentence includes it
        let end = found.start() + 1;
        let sentence = text[cursor..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        cursor = found.end();
    }

    let tail = text[cursor..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }

    Ok(sentences)
}

/// Accumulates sentences into token-bounded chunks with sentence overlap.
///
/// A chunk closes when appending the next sentence would push its token count
/// past `target_tokens`; the last `overlap_sentences` sentences seed the next
/// buffer so context survives the boundary. A single sentence over budget is
/// emitted whole rather than truncated.
pub fn chunk_text<C>(
    text: &str,
    options: &IngestionOptions,
    counter: &C,
) -> Result<Vec<String>, IngestError>
where
    C: TokenCounter + ?Sized,
{
    let sentences = split_sentences(text)?;

    let mut chunks = Vec::new();
    let mut buffer: Vec<String> = Vec::new();
    let mut buffered_tokens = 0usize;

    for sentence in sentences {
        let tokens = counter.count_tokens(&sentence)?;

        if buffered_tokens + tokens > options.target_tokens && !buffer.is_empty() {
            chunks.push(buffer.join(" "));

            let keep = options.overlap_sentences.min(buffer.len());
            buffer = buffer.split_off(buffer.len() - keep);

            buffered_tokens = 0;
            for kept in &buffer {
                buffered_tokens += counter.count_tokens(kept)?;
            }
        }

        buffered_tokens += tokens;
        buffer.push(sentence);
    }

    if !buffer.is_empty() {
        chunks.push(buffer.join(" "));
    }

    Ok(chunks)
}
