//! Notification emails sent at the end of a run

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

use crate::error::DigestError;
use crate::models::Chapter;

/// Subject of the success notification
pub fn success_subject(date: NaiveDate) -> String {
    format!("Your Daily News Digest Podcast - {}", date.format("%Y-%m-%d"))
}

/// Body of the success notification
pub fn success_body(url: &str, article_count: usize, chapters: &[Chapter]) -> String {
    let mut body = format!(
        "Hi,\n\nHere is your summarized news podcast for today ({} articles included).\n\n\
         Listen here: {}\n\nChapters:\n",
        article_count, url
    );
    for chapter in chapters {
        body.push_str(&format!("- {} ({})\n", chapter.title, chapter.start_timestamp()));
    }
    body.push_str("\nEnjoy!");
    body
}

/// Subject of the failure notification
pub fn failure_subject(error: &DigestError) -> String {
    if error.is_unexpected() {
        "Error: Daily Digest Failed Unexpectedly".to_string()
    } else {
        format!("Error: Daily Digest Failed ({})", error.kind_name())
    }
}

/// Body of the failure notification; `started` identifies the run in the logs
pub fn failure_body(error: &DigestError, started: DateTime<Utc>) -> String {
    let stamp = started.to_rfc3339_opts(SecondsFormat::Secs, true);
    if error.is_unexpected() {
        format!(
            "An unexpected error occurred during podcast generation:\n\n{}\n\nCheck the logs ({}) for details.",
            error, stamp
        )
    } else {
        format!(
            "The daily podcast generation failed.\n\nError:\n{}\n\nCheck the logs ({}) for details.",
            error, stamp
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_success_message() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 3).unwrap();
        assert_eq!(success_subject(date), "Your Daily News Digest Podcast - 2024-05-03");

        let chapters = vec![
            Chapter { title: "Intro".into(), start_ms: 0, end_ms: 3_000 },
            Chapter { title: "news@x.com".into(), start_ms: 3_750, end_ms: 95_000 },
            Chapter { title: "Outro".into(), start_ms: 95_750, end_ms: 98_000 },
        ];
        assert_eq!(
            success_body("https://example.com/ep.m4a", 1, &chapters),
            "Hi,\n\nHere is your summarized news podcast for today (1 articles included).\n\n\
             Listen here: https://example.com/ep.m4a\n\nChapters:\n\
             - Intro (00:00)\n- news@x.com (00:03)\n- Outro (01:35)\n\nEnjoy!"
        );
    }

    #[test]
    fn test_failure_message() {
        let err = DigestError::Summarization("Summarization yielded no results".into());
        assert_eq!(failure_subject(&err), "Error: Daily Digest Failed (SummarizationError)");

        let started = Utc.with_ymd_and_hms(2024, 5, 3, 7, 0, 0).unwrap();
        let body = failure_body(&err, started);
        assert!(body.starts_with("The daily podcast generation failed.\n\nError:\nSummarization failed: "));
        assert!(body.ends_with("(2024-05-03T07:00:00Z) for details."));
    }

    #[test]
    fn test_unexpected_failure_message() {
        let err = DigestError::Other("Content parsing task failed: panicked".into());
        assert_eq!(failure_subject(&err), "Error: Daily Digest Failed Unexpectedly");

        let started = Utc.with_ymd_and_hms(2024, 5, 3, 7, 0, 0).unwrap();
        assert_eq!(
            failure_body(&err, started),
            "An unexpected error occurred during podcast generation:\n\n\
             Content parsing task failed: panicked\n\n\
             Check the logs (2024-05-03T07:00:00Z) for details."
        );
    }
}
