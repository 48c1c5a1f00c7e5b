//! Part sizing for multipart uploads

/// S3 caps a multipart upload at 10,000 parts
pub(crate) const MAX_PARTS: u64 = 10_000;

/// Derived partitioning of an upload body
///
/// Invariant: `num_parts * part_size >= payload_size > (num_parts - 1) * part_size`
/// and `1 <= num_parts <= 10_000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UploadPlan {
    pub(crate) payload_size: u64,
    pub(crate) part_size: u64,
    pub(crate) num_parts: u64,
}

impl UploadPlan {
    /// Derive the plan for a payload. The part size is raised above the
    /// target when needed to respect the 10,000-part cap.
    pub(crate) fn for_payload(payload_size: u64, target_part_size: u64) -> Self {
        debug_assert!(payload_size > 0, "multipart plan requires a non-empty payload");
        let part_size = target_part_size.max(payload_size.div_ceil(MAX_PARTS));
        let num_parts = payload_size.div_ceil(part_size);
        Self {
            payload_size,
            part_size,
            num_parts,
        }
    }

    /// Byte offset of a 1-based part number
    pub(crate) fn part_offset(&self, part_number: u64) -> u64 {
        (part_number - 1) * self.part_size
    }

    /// Size of a 1-based part number. Only the last part may be short.
    pub(crate) fn size_of_part(&self, part_number: u64) -> u64 {
        if part_number == self.num_parts {
            self.payload_size - (self.num_parts - 1) * self.part_size
        } else {
            self.part_size
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_multiple() {
        let plan = UploadPlan::for_payload(100_000_000, 10_000_000);
        assert_eq!(plan.part_size, 10_000_000);
        assert_eq!(plan.num_parts, 10);
        assert_eq!(plan.size_of_part(10), 10_000_000);
    }

    #[test]
    fn test_remainder_part() {
        let plan = UploadPlan::for_payload(103, 10);
        assert_eq!(plan.part_size, 10);
        assert_eq!(plan.num_parts, 11);
        assert_eq!(plan.size_of_part(11), 3);
        assert_eq!(plan.part_offset(11), 100);
        for part in 1..=10 {
            assert_eq!(plan.size_of_part(part), 10);
        }
    }

    #[test]
    fn test_part_cap_raises_part_size() {
        // 100 GiB at a 1 MiB target would need 102,400 parts; the plan must
        // grow the part size to stay within the cap.
        let payload = 100 * 1024 * 1024 * 1024u64;
        let plan = UploadPlan::for_payload(payload, 1024 * 1024);
        assert!(plan.num_parts <= MAX_PARTS);
        assert!(plan.num_parts * plan.part_size >= payload);
    }

    #[test]
    fn test_bounding_invariant() {
        for (payload, target) in [
            (1u64, 10u64),
            (9, 10),
            (10, 10),
            (11, 10),
            (19, 10),
            (20, 10),
            (21, 10),
            (12_345_678, 5 * 1024 * 1024),
        ] {
            let plan = UploadPlan::for_payload(payload, target);
            assert!(plan.num_parts >= 1);
            assert!(
                plan.num_parts * plan.part_size >= payload,
                "plan covers payload: {plan:?}"
            );
            assert!(
                payload > (plan.num_parts - 1) * plan.part_size,
                "no empty trailing part: {plan:?}"
            );
        }
    }
}
