pub mod types;

pub use types::{Event, EventKind, PrRecord};

use tracing::{debug, warn};

use crate::forge::types::{PrState, ReviewDisposition};
use crate::forge::{Comment, Forge, ForgeError, PrDetail, PrRef, RetryPolicy, Review};
use crate::window::DateWindow;

/// Actor recorded on a close event when the author is unknown.
pub const UNKNOWN_ACTOR: &str = "unknown";

/// Comment and review sources fetched for one pull request.
#[derive(Debug, Clone, Default)]
pub struct PrSources {
    pub review_comments: Vec<Comment>,
    pub issue_comments: Vec<Comment>,
    pub reviews: Vec<Review>,
}

/// Fetch the three comment/review sources of a pull request, one after another.
///
/// A source that fails with an ordinary transport error is logged and treated
/// as empty so the rest of the PR survives. Fatal errors (exhausted rate limit)
/// propagate.
pub async fn collect_sources(
    forge: &dyn Forge,
    retry: &RetryPolicy,
    pr: &PrRef,
) -> Result<PrSources, ForgeError> {
    let review_comments = tolerate(
        "review comments",
        pr,
        retry
            .run(&format!("list review comments of {pr}"), move || forge.review_comments(pr))
            .await,
    )?;
    let issue_comments = tolerate(
        "issue comments",
        pr,
        retry
            .run(&format!("list issue comments of {pr}"), move || forge.issue_comments(pr))
            .await,
    )?;
    let reviews = tolerate(
        "reviews",
        pr,
        retry
            .run(&format!("list reviews of {pr}"), move || forge.reviews(pr))
            .await,
    )?;

    Ok(PrSources {
        review_comments,
        issue_comments,
        reviews,
    })
}

fn tolerate<T>(
    source: &str,
    pr: &PrRef,
    result: Result<Vec<T>, ForgeError>,
) -> Result<Vec<T>, ForgeError> {
    match result {
        Ok(items) => Ok(items),
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            warn!(pr = %pr, error = %err, "failed to fetch {source}, continuing without them");
            Ok(Vec::new())
        }
    }
}

/// Merge a pull request's metadata and sources into one timeline.
///
/// Creation, approval, change-request, merge and close events are always kept.
/// Prose comments (inline, conversation, and review bodies) are kept only when
/// they fall inside `window`. The result is sorted by timestamp; events sharing
/// a timestamp keep the order above.
pub fn aggregate(detail: &PrDetail, sources: &PrSources, window: &DateWindow) -> Vec<Event> {
    let mut events = Vec::new();

    if let Some(author) = &detail.author {
        events.push(Event::new(EventKind::Created, detail.created_at, author));
    }

    for comment in sources.review_comments.iter().chain(&sources.issue_comments) {
        let Some(actor) = &comment.actor else {
            continue;
        };
        if !window.admits(comment.created_at) {
            continue;
        }
        match comment.created_at {
            Some(at) => events.push(Event::new(EventKind::Comment, at, actor)),
            None => debug!(pr = detail.number, %actor, "undated comment, cannot place on timeline"),
        }
    }

    for review in &sources.reviews {
        let (Some(actor), Some(at)) = (&review.actor, review.submitted_at) else {
            continue;
        };
        match review.disposition {
            ReviewDisposition::Approved => events.push(Event::new(EventKind::Approved, at, actor)),
            ReviewDisposition::ChangesRequested => {
                events.push(Event::new(EventKind::ChangesRequested, at, actor))
            }
            ReviewDisposition::Commented | ReviewDisposition::Other => {}
        }
        let has_body = review.body.as_deref().is_some_and(|b| !b.is_empty());
        if has_body && window.contains(at) {
            events.push(Event::new(EventKind::Comment, at, actor));
        }
    }

    if let Some(event) = terminal_event(detail) {
        events.push(event);
    }

    events.sort_by_key(|e| e.timestamp);
    events
}

fn terminal_event(detail: &PrDetail) -> Option<Event> {
    if detail.merged {
        let actor = detail.merged_by.as_ref()?;
        let at = detail.merged_at.or(detail.closed_at)?;
        return Some(Event::new(EventKind::Merged, at, actor));
    }
    if detail.state == PrState::Closed {
        // Who closed an unmerged PR is not exposed without the timeline API.
        let at = detail.closed_at?;
        let actor = detail.author.as_deref().unwrap_or(UNKNOWN_ACTOR);
        return Some(Event::new(EventKind::Closed, at, actor));
    }
    None
}

/// Build the record for a pull request, or `None` when it has no events.
pub fn build_record(detail: &PrDetail, sources: &PrSources, window: &DateWindow) -> Option<PrRecord> {
    let events = aggregate(detail, sources, window);
    if events.is_empty() {
        debug!(pr = detail.number, "no events, dropping");
        return None;
    }
    Some(PrRecord {
        number: detail.number,
        title: detail.title.clone(),
        events,
    })
}
