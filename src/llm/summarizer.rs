//! Summary length planning and batch summarization

use tracing::{info, warn};

use super::Summarizer;
use crate::models::{EmailContent, Summary, TargetLength};

/// System message sent with every summary request
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that summarizes articles for a podcast.";

/// Every summary gets at least this many words
pub const MIN_WORDS_PER_SUMMARY: usize = 50;

/// Target used when the total word count is zero
const EMPTY_INPUT_TARGET: usize = 100;

/// Target used when an item has no computed target
const FALLBACK_TARGET: usize = 150;

/// Pick the episode duration for `total_words` of source text, clamped into
/// `[min_mins, max_mins]`
pub fn target_duration_mins(total_words: usize, min_mins: u32, max_mins: u32) -> u32 {
    let tier = match total_words {
        0..=2_999 => min_mins,
        3_000..=7_999 => 45,
        8_000..=14_999 => 60,
        _ => 75,
    };
    // min first so a min > max configuration still yields min
    tier.min(max_mins).max(min_mins)
}

/// Split the episode's word budget across `contents` in proportion to their
/// length. The result is index-aligned with `contents`.
pub fn calculate_target_lengths(
    contents: &[EmailContent],
    min_duration_mins: u32,
    max_duration_mins: u32,
    words_per_minute: u32,
) -> Vec<TargetLength> {
    if contents.is_empty() {
        return Vec::new();
    }

    let counts: Vec<usize> = contents.iter().map(EmailContent::word_count).collect();
    let total_words: usize = counts.iter().sum();

    if total_words == 0 {
        warn!("Total original word count is zero. Using default targets.");
        return contents
            .iter()
            .map(|c| TargetLength { source: c.source.clone(), target_words: EMPTY_INPUT_TARGET })
            .collect();
    }

    let duration = target_duration_mins(total_words, min_duration_mins, max_duration_mins);
    let total_target = duration as usize * words_per_minute as usize;
    info!(
        "Total original words: {}. Aiming for target duration: {} mins ({} words).",
        total_words, duration, total_target
    );

    let targets: Vec<TargetLength> = contents
        .iter()
        .zip(&counts)
        .map(|(content, &words)| {
            let share = (words as f64 / total_words as f64 * total_target as f64).floor() as usize;
            TargetLength {
                source: content.source.clone(),
                target_words: share.max(MIN_WORDS_PER_SUMMARY),
            }
        })
        .collect();

    info!(
        "Calculated target lengths. Sum of targets: {} words.",
        targets.iter().map(|t| t.target_words).sum::<usize>()
    );
    targets
}

/// Completion token budget for a summary of `target_words`
pub fn max_tokens_for(target_words: usize) -> u32 {
    ((target_words as f64 / 0.6).floor() as u32).max(100)
}

/// User prompt asking for a podcast-style summary
pub fn build_prompt(text: &str, source: &str, target_words: usize) -> String {
    format!(
        "Please act as a concise news summarizer for a spoken podcast format.\n\
         Summarize the following article from '{source}'.\n\
         Focus on the key information, main points, and conclusions. \
         Avoid introductory phrases like \"This article discusses...\". Get straight to the point.\n\
         Aim for a summary length of approximately {target_words} words.\n\
         \n\
         Article Text:\n\
         ---\n\
         {text}\n\
         ---\n\
         \n\
         Summary:\n"
    )
}

/// Summarize every article.
///
/// Failed or empty summaries are logged and left out; the rest keep their
/// input order.
pub async fn summarize_all(
    summarizer: &dyn Summarizer,
    contents: &[EmailContent],
    min_duration_mins: u32,
    max_duration_mins: u32,
    words_per_minute: u32,
) -> Vec<Summary> {
    if contents.is_empty() {
        warn!("summarize_all called with no content");
        return Vec::new();
    }

    let targets = calculate_target_lengths(contents, min_duration_mins, max_duration_mins, words_per_minute);
    let mut summaries = Vec::with_capacity(contents.len());

    for (i, content) in contents.iter().enumerate() {
        if content.original_text.trim().is_empty() {
            warn!("Received empty text for source '{}'. Skipping summarization.", content.source);
            continue;
        }

        let target_words = match targets.get(i) {
            Some(t) if t.target_words > 0 => t.target_words,
            _ => {
                warn!(
                    "Could not find target word count for source '{}'. Using default {}.",
                    content.source, FALLBACK_TARGET
                );
                FALLBACK_TARGET
            }
        };

        match summarizer.summarize(&content.original_text, &content.source, target_words).await {
            Ok(text) if !text.trim().is_empty() => {
                info!(
                    "Summary received for '{}'. Actual word count: {} (Target: ~{})",
                    content.source,
                    text.split_whitespace().count(),
                    target_words
                );
                summaries.push(Summary { source: content.source.clone(), summary_text: text });
            }
            Ok(_) => warn!("Empty summary for source '{}'. It will be excluded.", content.source),
            Err(e) => warn!("Summarization failed for source '{}': {}. It will be excluded.", content.source, e),
        }
    }

    if summaries.is_empty() {
        warn!("No summaries were successfully generated");
    } else {
        info!("Successfully generated {} summaries", summaries.len());
    }
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DigestError, Result};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn content(source: &str, words: usize) -> EmailContent {
        EmailContent {
            source: source.to_string(),
            original_text: vec!["word"; words].join(" "),
        }
    }

    #[test]
    fn test_duration_tiers() {
        assert_eq!(target_duration_mins(0, 30, 90), 30);
        assert_eq!(target_duration_mins(2_999, 30, 90), 30);
        assert_eq!(target_duration_mins(3_000, 30, 90), 45);
        assert_eq!(target_duration_mins(8_000, 30, 90), 60);
        assert_eq!(target_duration_mins(15_000, 30, 90), 75);
    }

    #[test]
    fn test_duration_is_clamped() {
        assert_eq!(target_duration_mins(20_000, 30, 60), 60);
        assert_eq!(target_duration_mins(5_000, 50, 90), 50);
        assert_eq!(target_duration_mins(100, 10, 90), 10);
    }

    #[test]
    fn test_proportional_targets() {
        // 1000 words total -> 30 min * 150 wpm = 4500 words
        let contents = vec![content("a@x.com", 750), content("b@x.com", 250)];
        let targets = calculate_target_lengths(&contents, 30, 90, 150);
        assert_eq!(
            targets,
            vec![
                TargetLength { source: "a@x.com".into(), target_words: 3375 },
                TargetLength { source: "b@x.com".into(), target_words: 1125 },
            ]
        );
    }

    #[test]
    fn test_minimum_target() {
        // 12000 words -> 60 min * 150 = 9000; 1/12000 share floors to 0
        let contents = vec![content("big@x.com", 11_999), content("tiny@x.com", 1)];
        let targets = calculate_target_lengths(&contents, 30, 90, 150);
        assert_eq!(targets[0].target_words, 8999);
        assert_eq!(targets[1].target_words, MIN_WORDS_PER_SUMMARY);
    }

    #[test]
    fn test_zero_words() {
        let contents = vec![content("a@x.com", 0), content("b@x.com", 0)];
        let targets = calculate_target_lengths(&contents, 30, 90, 150);
        assert!(targets.iter().all(|t| t.target_words == 100));
        assert!(calculate_target_lengths(&[], 30, 90, 150).is_empty());
    }

    #[test]
    fn test_max_tokens() {
        assert_eq!(max_tokens_for(30), 100);
        assert_eq!(max_tokens_for(60), 100);
        assert_eq!(max_tokens_for(300), 500);
        assert_eq!(max_tokens_for(1000), 1666);
    }

    #[test]
    fn test_build_prompt() {
        let prompt = build_prompt("Body text.", "news@x.com", 120);
        assert!(prompt.starts_with("Please act as a concise news summarizer"));
        assert!(prompt.contains("from 'news@x.com'"));
        assert!(prompt.contains("approximately 120 words"));
        assert!(prompt.contains("---\nBody text.\n---"));
        assert!(prompt.trim_end().ends_with("Summary:"));
    }

    struct FakeSummarizer {
        calls: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl Summarizer for FakeSummarizer {
        async fn summarize(&self, _text: &str, source: &str, target_words: usize) -> Result<String> {
            self.calls.lock().unwrap().push((source.to_string(), target_words));
            match source {
                "fail@x.com" => Err(DigestError::Summarization("boom".into())),
                "blank@x.com" => Ok("   ".into()),
                _ => Ok(format!("Summary of {}", source)),
            }
        }
    }

    #[tokio::test]
    async fn test_summarize_all_skips_failures() {
        let fake = FakeSummarizer { calls: Mutex::new(Vec::new()) };
        let contents = vec![
            content("a@x.com", 500),
            content("fail@x.com", 500),
            content("empty@x.com", 0),
            content("blank@x.com", 500),
            content("b@x.com", 500),
        ];

        let summaries = summarize_all(&fake, &contents, 30, 90, 150).await;
        assert_eq!(
            summaries,
            vec![
                Summary { source: "a@x.com".into(), summary_text: "Summary of a@x.com".into() },
                Summary { source: "b@x.com".into(), summary_text: "Summary of b@x.com".into() },
            ]
        );

        let calls = fake.calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
        // 2000 words -> 4500 word budget split four ways
        assert!(calls.iter().all(|(_, target)| *target == 1125));
    }

    #[tokio::test]
    async fn test_summarize_all_empty() {
        let fake = FakeSummarizer { calls: Mutex::new(Vec::new()) };
        assert!(summarize_all(&fake, &[], 30, 90, 150).await.is_empty());
        assert!(fake.calls.lock().unwrap().is_empty());
    }
}
