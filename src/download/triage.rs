//! Download strategy selection and the triage request
//!
//! Every multi-segment download starts with one GET that both fetches the
//! first segment and discovers the object's size, part count, and ETag. The
//! ETag becomes the validator tag pinned onto every subsequent request via
//! `If-Match`, so the object cannot mutate mid-transfer.
//!
//! The triage request itself is unpinned: an object replaced concurrently
//! with triage is only detected by a size or segment-count mismatch.

use std::str::FromStr;

use crate::client::{GetObjectInput, GetObjectOutput};
use crate::config::{ChecksumMode, MultipartDownloadType};
use crate::error::{TransferError, TransferResult};
use crate::header::{ByteRange, ContentRange, Range};
use crate::manager::TransferContext;

/// How one download request is served
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DownloadStrategy {
    /// Single GET for an explicit part number
    SinglePart(i32),
    /// Single GET for an explicit range, when the split strategy is ByPart
    SingleRange(Range),
    /// Multi-part download by part number
    PartSplit,
    /// Multi-range download of `[start, end]`; `end` is learned from triage
    /// when absent
    RangeSplit { start: u64, end: Option<u64> },
}

/// Apply the strategy-selection precedence table
pub(crate) fn select_strategy(
    part_number: Option<i32>,
    range: Option<&str>,
    mode: MultipartDownloadType,
) -> TransferResult<DownloadStrategy> {
    if let Some(part) = part_number {
        return Ok(DownloadStrategy::SinglePart(part));
    }

    match (range, mode) {
        (Some(header), MultipartDownloadType::ByPart) => {
            Ok(DownloadStrategy::SingleRange(Range::from_str(header)?))
        }
        (Some(header), MultipartDownloadType::ByRange) => match Range::from_str(header)?.0 {
            ByteRange::Inclusive(start, end) => Ok(DownloadStrategy::RangeSplit {
                start,
                end: Some(end),
            }),
            ByteRange::AllFrom(start) => Ok(DownloadStrategy::RangeSplit { start, end: None }),
        },
        (None, MultipartDownloadType::ByPart) => Ok(DownloadStrategy::PartSplit),
        (None, MultipartDownloadType::ByRange) => {
            Ok(DownloadStrategy::RangeSplit { start: 0, end: None })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SplitKind {
    Part,
    Range,
}

/// Everything the fan-out phase needs, derived from the triage response
#[derive(Debug, Clone)]
pub(crate) struct DownloadPlan {
    pub(crate) kind: SplitKind,
    /// Authoritative object size from the `Content-Range` total
    pub(crate) object_size: u64,
    /// Segment size used for batching and memory reservations
    pub(crate) segment_size: u64,
    /// Segments still to fetch after triage
    pub(crate) num_remaining: u64,
    /// ETag pinned onto every remaining request
    pub(crate) validator_tag: Option<String>,
    /// Total bytes this download will deliver to the sink
    pub(crate) total_transfer_bytes: u64,
    /// Response-checksum policy forwarded on every remaining request
    checksum_validation: ChecksumMode,
    /// First byte of the requested window (RangeSplit only)
    start: u64,
    /// Last byte of the requested window, inclusive (RangeSplit only)
    effective_end: u64,
}

impl DownloadPlan {
    /// Build the GET input for the 1-based remaining-segment `index`.
    /// Index 0 was the triage request.
    pub(crate) fn segment_input(&self, bucket: &str, key: &str, index: u64) -> GetObjectInput {
        let mut input = GetObjectInput {
            bucket: bucket.to_string(),
            key: key.to_string(),
            if_match: self.validator_tag.clone(),
            checksum_validation: self.checksum_validation,
            ..GetObjectInput::default()
        };
        match self.kind {
            SplitKind::Part => {
                input.part_number = Some((index + 1) as i32);
            }
            SplitKind::Range => {
                let sub_start = self.start + index * self.segment_size;
                // Clamp to the discovered end rather than relying on the
                // server truncating an overshooting range.
                let sub_end = (sub_start + self.segment_size - 1).min(self.effective_end);
                input.range = Some(Range::bytes_inclusive(sub_start, sub_end).to_string());
            }
        }
        input
    }

    /// Expected byte length of the 1-based remaining-segment `index`, when
    /// knowable up front. Part sizes are server-defined and unknown.
    pub(crate) fn expected_segment_len(&self, index: u64) -> Option<u64> {
        match self.kind {
            SplitKind::Part => None,
            SplitKind::Range => {
                let sub_start = self.start + index * self.segment_size;
                let sub_end = (sub_start + self.segment_size - 1).min(self.effective_end);
                Some(sub_end - sub_start + 1)
            }
        }
    }
}

/// Issue the triage GET for a by-part download: `part_number = 1`
pub(crate) async fn triage_by_part(
    ctx: &TransferContext,
    bucket: &str,
    key: &str,
) -> TransferResult<(GetObjectOutput, DownloadPlan)> {
    let output = triage_get(
        ctx,
        GetObjectInput {
            bucket: bucket.to_string(),
            key: key.to_string(),
            part_number: Some(1),
            checksum_validation: ctx.config.response_checksum_validation,
            ..GetObjectInput::default()
        },
    )
    .await?;

    let object_size = resolve_object_size(&output)?;
    let parts_count = output.parts_count.unwrap_or(1).max(1) as u64;
    let first_len = output.body.len() as u64;

    let plan = DownloadPlan {
        kind: SplitKind::Part,
        object_size,
        segment_size: first_len.max(1),
        num_remaining: parts_count - 1,
        validator_tag: output.e_tag.clone(),
        total_transfer_bytes: object_size,
        checksum_validation: ctx.config.response_checksum_validation,
        start: 0,
        effective_end: object_size.saturating_sub(1),
    };
    Ok((output, plan))
}

/// Issue the triage GET for a ranged download: the first segment of the
/// requested window. Learns the object size from `Content-Range`.
pub(crate) async fn triage_by_range(
    ctx: &TransferContext,
    bucket: &str,
    key: &str,
    start: u64,
    end: Option<u64>,
    segment_size: u64,
) -> TransferResult<(GetObjectOutput, DownloadPlan)> {
    let first_end_candidate = start + segment_size - 1;
    let request_end = match end {
        Some(end) => first_end_candidate.min(end),
        None => first_end_candidate,
    };

    let output = triage_get(
        ctx,
        GetObjectInput {
            bucket: bucket.to_string(),
            key: key.to_string(),
            range: Some(Range::bytes_inclusive(start, request_end).to_string()),
            checksum_validation: ctx.config.response_checksum_validation,
            ..GetObjectInput::default()
        },
    )
    .await?;

    let object_size = match &output.content_range {
        Some(header) => ContentRange::from_str(header)?.total,
        None => return Err(TransferError::FailedToDetermineObjectSize),
    };

    let effective_end = match end {
        Some(end) => end.min(object_size.saturating_sub(1)),
        None => object_size.saturating_sub(1),
    };
    let span = effective_end.saturating_sub(start) + 1;
    let num_remaining = span.div_ceil(segment_size).saturating_sub(1);

    let plan = DownloadPlan {
        kind: SplitKind::Range,
        object_size,
        segment_size,
        num_remaining,
        validator_tag: output.e_tag.clone(),
        total_transfer_bytes: span,
        checksum_validation: ctx.config.response_checksum_validation,
        start,
        effective_end,
    };
    Ok((output, plan))
}

async fn triage_get(
    ctx: &TransferContext,
    input: GetObjectInput,
) -> TransferResult<GetObjectOutput> {
    let _permit = ctx.buckets.acquire(&input.bucket).await;
    ctx.ensure_active()?;
    ctx.client
        .get_object(input)
        .await
        .map_err(TransferError::Client)
}

fn resolve_object_size(output: &GetObjectOutput) -> TransferResult<u64> {
    match &output.content_range {
        Some(header) => Ok(ContentRange::from_str(header)?.total),
        None => Ok(output.content_length),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_precedence() {
        // Explicit part number wins over everything.
        assert_eq!(
            select_strategy(Some(3), Some("bytes=0-10"), MultipartDownloadType::ByRange).unwrap(),
            DownloadStrategy::SinglePart(3)
        );

        // Explicit range with ByPart falls through to a single GET.
        assert!(matches!(
            select_strategy(None, Some("bytes=0-10"), MultipartDownloadType::ByPart).unwrap(),
            DownloadStrategy::SingleRange(_)
        ));

        // Explicit range with ByRange splits.
        assert_eq!(
            select_strategy(None, Some("bytes=5-100"), MultipartDownloadType::ByRange).unwrap(),
            DownloadStrategy::RangeSplit {
                start: 5,
                end: Some(100)
            }
        );
        assert_eq!(
            select_strategy(None, Some("bytes=5-"), MultipartDownloadType::ByRange).unwrap(),
            DownloadStrategy::RangeSplit {
                start: 5,
                end: None
            }
        );

        // No inputs: config decides.
        assert_eq!(
            select_strategy(None, None, MultipartDownloadType::ByPart).unwrap(),
            DownloadStrategy::PartSplit
        );
        assert_eq!(
            select_strategy(None, None, MultipartDownloadType::ByRange).unwrap(),
            DownloadStrategy::RangeSplit {
                start: 0,
                end: None
            }
        );
    }

    #[test]
    fn test_invalid_range_rejected() {
        assert!(select_strategy(None, Some("bytes=-5"), MultipartDownloadType::ByRange).is_err());
        assert!(select_strategy(None, Some("junk"), MultipartDownloadType::ByPart).is_err());
    }

    fn range_plan(object_size: u64, start: u64, end: Option<u64>, segment: u64) -> DownloadPlan {
        let effective_end = end
            .map(|e| e.min(object_size - 1))
            .unwrap_or(object_size - 1);
        let span = effective_end - start + 1;
        DownloadPlan {
            kind: SplitKind::Range,
            object_size,
            segment_size: segment,
            num_remaining: span.div_ceil(segment).saturating_sub(1),
            validator_tag: Some("\"etag\"".to_string()),
            total_transfer_bytes: span,
            checksum_validation: ChecksumMode::default(),
            start,
            effective_end,
        }
    }

    #[test]
    fn test_remaining_count_at_exact_multiple() {
        // 20 MiB object, 10 MiB segments: exactly one segment remains after
        // triage, not two.
        let plan = range_plan(20 * 1024 * 1024, 0, None, 10 * 1024 * 1024);
        assert_eq!(plan.num_remaining, 1);

        let plan = range_plan(25 * 1024 * 1024, 0, None, 10 * 1024 * 1024);
        assert_eq!(plan.num_remaining, 2);

        // Object no larger than one segment: triage fetched everything.
        let plan = range_plan(5 * 1024 * 1024, 0, None, 10 * 1024 * 1024);
        assert_eq!(plan.num_remaining, 0);
    }

    #[test]
    fn test_segment_requests_are_clamped_and_pinned() {
        let plan = range_plan(26214400, 0, None, 10485760);
        assert_eq!(plan.num_remaining, 2);

        let second = plan.segment_input("b", "k", 1);
        assert_eq!(second.range.as_deref(), Some("bytes=10485760-20971519"));
        assert_eq!(second.if_match.as_deref(), Some("\"etag\""));

        // The last request is clamped to the discovered end instead of
        // overshooting the object.
        let third = plan.segment_input("b", "k", 2);
        assert_eq!(third.range.as_deref(), Some("bytes=20971520-26214399"));
        assert_eq!(plan.expected_segment_len(2), Some(26214400 - 20971520));
    }

    #[test]
    fn test_part_segment_inputs() {
        let plan = DownloadPlan {
            kind: SplitKind::Part,
            object_size: 100,
            segment_size: 25,
            num_remaining: 3,
            validator_tag: Some("\"v\"".to_string()),
            total_transfer_bytes: 100,
            checksum_validation: ChecksumMode::default(),
            start: 0,
            effective_end: 99,
        };

        let input = plan.segment_input("b", "k", 1);
        assert_eq!(input.part_number, Some(2));
        assert_eq!(input.if_match.as_deref(), Some("\"v\""));
        assert!(input.range.is_none());
        assert_eq!(plan.expected_segment_len(1), None);
    }
}
