//! In-memory `ObjectClient` for tests and local development
//!
//! Stores objects in process memory and models the parts of S3 the engine
//! depends on: part-number and ranged GETs with `Content-Range`, `If-Match`
//! preconditions, the multipart lifecycle, and paginated listing. Every
//! call is recorded so tests can assert exactly which requests the engine
//! issued. Do not use in production.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use super::{
    AbortMultipartUploadInput, ClientResult, CompleteMultipartUploadInput,
    CompleteMultipartUploadOutput, CreateMultipartUploadInput, CreateMultipartUploadOutput,
    GetObjectInput, GetObjectOutput, ListObjectsInput, ListObjectsPage, ObjectClient,
    ObjectSummary, PutObjectInput, PutObjectOutput, UploadPartInput, UploadPartOutput,
};
use crate::header::{ByteRange, Range};

/// One recorded client call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallRecord {
    /// A `PutObject` call
    PutObject {
        /// Target key
        key: String,
        /// Whole-object checksum value sent with the request
        full_object_checksum: Option<String>,
    },
    /// A `CreateMultipartUpload` call
    CreateMultipartUpload {
        /// Target key
        key: String,
    },
    /// An `UploadPart` call
    UploadPart {
        /// Target key
        key: String,
        /// Part number uploaded
        part_number: i32,
        /// Part length in bytes
        len: u64,
    },
    /// A `CompleteMultipartUpload` call
    CompleteMultipartUpload {
        /// Target key
        key: String,
        /// Part numbers in the order they were submitted
        part_numbers: Vec<i32>,
        /// Whole-object checksum value sent with the commit
        full_object_checksum: Option<String>,
    },
    /// An `AbortMultipartUpload` call
    AbortMultipartUpload {
        /// Target key
        key: String,
        /// Upload released
        upload_id: String,
    },
    /// A `GetObject` call
    GetObject {
        /// Source key
        key: String,
        /// Part number requested
        part_number: Option<i32>,
        /// Range requested
        range: Option<String>,
        /// `If-Match` precondition sent
        if_match: Option<String>,
    },
    /// A `ListObjectsV2` call
    ListObjectsV2 {
        /// Prefix filter
        prefix: Option<String>,
    },
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    e_tag: String,
    /// Part lengths for multipart-assembled objects
    part_sizes: Option<Vec<u64>>,
}

#[derive(Debug)]
struct UploadState {
    bucket: String,
    key: String,
    parts: BTreeMap<i32, (Bytes, String)>,
}

#[derive(Debug, Default)]
struct StoreState {
    objects: BTreeMap<(String, String), StoredObject>,
    uploads: HashMap<String, UploadState>,
    aborted: Vec<String>,
    calls: Vec<CallRecord>,
    next_id: u64,
    page_size: Option<usize>,
    fail_part_numbers: HashSet<i32>,
    fail_complete: bool,
    fail_abort: bool,
    fail_get_keys: HashSet<String>,
    fail_put_keys: HashSet<String>,
}

/// Process-local [`ObjectClient`] implementation
#[derive(Debug, Default)]
pub struct InMemoryObjectClient {
    state: Mutex<StoreState>,
}

impl InMemoryObjectClient {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object
    pub fn insert_object(
        &self,
        bucket: impl Into<String>,
        key: impl Into<String>,
        data: impl Into<Bytes>,
    ) {
        let mut state = self.state.lock().unwrap();
        let e_tag = next_etag(&mut state);
        state.objects.insert(
            (bucket.into(), key.into()),
            StoredObject {
                data: data.into(),
                e_tag,
                part_sizes: None,
            },
        );
    }

    /// Seed an object assembled from the given parts, as a completed
    /// multipart upload would leave it
    pub fn insert_object_with_parts(
        &self,
        bucket: impl Into<String>,
        key: impl Into<String>,
        parts: Vec<Bytes>,
    ) {
        let mut state = self.state.lock().unwrap();
        let e_tag = next_etag(&mut state);
        let part_sizes: Vec<u64> = parts.iter().map(|p| p.len() as u64).collect();
        let mut data = BytesMut::new();
        for part in &parts {
            data.extend_from_slice(part);
        }
        state.objects.insert(
            (bucket.into(), key.into()),
            StoredObject {
                data: data.freeze(),
                e_tag,
                part_sizes: Some(part_sizes),
            },
        );
    }

    /// Stored bytes of an object, if present
    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.data.clone())
    }

    /// All recorded calls, in order
    pub fn calls(&self) -> Vec<CallRecord> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Upload ids released through abort
    pub fn aborted_upload_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().aborted.clone()
    }

    /// Multipart uploads still neither completed nor aborted
    pub fn active_upload_count(&self) -> usize {
        self.state.lock().unwrap().uploads.len()
    }

    /// Cap listing pages at `size` objects to exercise pagination
    pub fn set_page_size(&self, size: usize) {
        self.state.lock().unwrap().page_size = Some(size);
    }

    /// Make `UploadPart` fail for the given part number
    pub fn fail_upload_part(&self, part_number: i32) {
        self.state
            .lock()
            .unwrap()
            .fail_part_numbers
            .insert(part_number);
    }

    /// Make `CompleteMultipartUpload` fail
    pub fn fail_complete(&self) {
        self.state.lock().unwrap().fail_complete = true;
    }

    /// Make `AbortMultipartUpload` fail
    pub fn fail_abort(&self) {
        self.state.lock().unwrap().fail_abort = true;
    }

    /// Make `GetObject` fail for the given key
    pub fn fail_get_object(&self, key: impl Into<String>) {
        self.state.lock().unwrap().fail_get_keys.insert(key.into());
    }

    /// Make `PutObject` fail for the given key
    pub fn fail_put_object(&self, key: impl Into<String>) {
        self.state.lock().unwrap().fail_put_keys.insert(key.into());
    }
}

fn next_etag(state: &mut StoreState) -> String {
    state.next_id += 1;
    format!("\"etag-{}\"", state.next_id)
}

fn err(message: impl Into<String>) -> Box<dyn std::error::Error + Send + Sync> {
    message.into().into()
}

#[async_trait]
impl ObjectClient for InMemoryObjectClient {
    async fn put_object(&self, input: PutObjectInput) -> ClientResult<PutObjectOutput> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(CallRecord::PutObject {
            key: input.key.clone(),
            full_object_checksum: input.full_object_checksum.clone(),
        });

        if state.fail_put_keys.contains(&input.key) {
            return Err(err(format!("injected put failure for {}", input.key)));
        }

        let e_tag = next_etag(&mut state);
        state.objects.insert(
            (input.bucket, input.key),
            StoredObject {
                data: input.body,
                e_tag: e_tag.clone(),
                part_sizes: None,
            },
        );
        Ok(PutObjectOutput { e_tag: Some(e_tag) })
    }

    async fn create_multipart_upload(
        &self,
        input: CreateMultipartUploadInput,
    ) -> ClientResult<CreateMultipartUploadOutput> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(CallRecord::CreateMultipartUpload {
            key: input.key.clone(),
        });

        state.next_id += 1;
        let upload_id = format!("upload-{}", state.next_id);
        state.uploads.insert(
            upload_id.clone(),
            UploadState {
                bucket: input.bucket,
                key: input.key,
                parts: BTreeMap::new(),
            },
        );
        Ok(CreateMultipartUploadOutput { upload_id })
    }

    async fn upload_part(&self, input: UploadPartInput) -> ClientResult<UploadPartOutput> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(CallRecord::UploadPart {
            key: input.key.clone(),
            part_number: input.part_number,
            len: input.body.len() as u64,
        });

        if state.fail_part_numbers.contains(&input.part_number) {
            return Err(err(format!(
                "injected failure for part {}",
                input.part_number
            )));
        }

        let e_tag = next_etag(&mut state);
        let upload = state
            .uploads
            .get_mut(&input.upload_id)
            .ok_or_else(|| err("NoSuchUpload"))?;
        upload
            .parts
            .insert(input.part_number, (input.body, e_tag.clone()));
        Ok(UploadPartOutput {
            e_tag,
            checksum: None,
        })
    }

    async fn complete_multipart_upload(
        &self,
        input: CompleteMultipartUploadInput,
    ) -> ClientResult<CompleteMultipartUploadOutput> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(CallRecord::CompleteMultipartUpload {
            key: input.key.clone(),
            part_numbers: input.parts.iter().map(|p| p.part_number).collect(),
            full_object_checksum: input.full_object_checksum.clone(),
        });

        if state.fail_complete {
            return Err(err("injected complete failure"));
        }

        let upload = state
            .uploads
            .remove(&input.upload_id)
            .ok_or_else(|| err("NoSuchUpload"))?;

        // The part list is position sensitive: strictly ascending part
        // numbers, each matching a staged part's etag.
        let mut data = BytesMut::new();
        let mut part_sizes = Vec::with_capacity(input.parts.len());
        let mut previous = 0;
        for part in &input.parts {
            if part.part_number <= previous {
                return Err(err("InvalidPartOrder"));
            }
            previous = part.part_number;

            let (bytes, e_tag) = upload
                .parts
                .get(&part.part_number)
                .ok_or_else(|| err("InvalidPart"))?;
            if *e_tag != part.e_tag {
                return Err(err("InvalidPart"));
            }
            part_sizes.push(bytes.len() as u64);
            data.extend_from_slice(bytes);
        }

        let e_tag = {
            state.next_id += 1;
            format!("\"etag-{}-{}\"", state.next_id, input.parts.len())
        };
        state.objects.insert(
            (upload.bucket, upload.key),
            StoredObject {
                data: data.freeze(),
                e_tag: e_tag.clone(),
                part_sizes: Some(part_sizes),
            },
        );
        Ok(CompleteMultipartUploadOutput { e_tag: Some(e_tag) })
    }

    async fn abort_multipart_upload(&self, input: AbortMultipartUploadInput) -> ClientResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(CallRecord::AbortMultipartUpload {
            key: input.key.clone(),
            upload_id: input.upload_id.clone(),
        });

        if state.fail_abort {
            return Err(err("injected abort failure"));
        }

        state
            .uploads
            .remove(&input.upload_id)
            .ok_or_else(|| err("NoSuchUpload"))?;
        state.aborted.push(input.upload_id);
        Ok(())
    }

    async fn get_object(&self, input: GetObjectInput) -> ClientResult<GetObjectOutput> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(CallRecord::GetObject {
            key: input.key.clone(),
            part_number: input.part_number,
            range: input.range.clone(),
            if_match: input.if_match.clone(),
        });

        if state.fail_get_keys.contains(&input.key) {
            return Err(err(format!("injected get failure for {}", input.key)));
        }

        let object = state
            .objects
            .get(&(input.bucket.clone(), input.key.clone()))
            .ok_or_else(|| err("NoSuchKey"))?
            .clone();

        if let Some(expected) = &input.if_match {
            if *expected != object.e_tag {
                return Err(err("PreconditionFailed"));
            }
        }

        let total = object.data.len() as u64;

        if let Some(part_number) = input.part_number {
            let part_sizes = object.part_sizes.clone().unwrap_or_else(|| vec![total]);
            let index = part_number as usize;
            if part_number < 1 || index > part_sizes.len() {
                return Err(err("InvalidPartNumber"));
            }
            let start: u64 = part_sizes[..index - 1].iter().sum();
            let len = part_sizes[index - 1];
            let body = object.data.slice(start as usize..(start + len) as usize);
            let content_range = if len > 0 {
                Some(format!("bytes {}-{}/{}", start, start + len - 1, total))
            } else {
                None
            };
            return Ok(GetObjectOutput {
                body,
                content_length: len,
                content_range,
                e_tag: Some(object.e_tag),
                parts_count: Some(part_sizes.len() as i32),
            });
        }

        if let Some(range) = &input.range {
            let parsed = Range::from_str(range).map_err(|e| err(e.to_string()))?;
            let (start, end) = match parsed.0 {
                ByteRange::Inclusive(start, end) => (start, end.min(total.saturating_sub(1))),
                ByteRange::AllFrom(start) => (start, total.saturating_sub(1)),
            };
            if start >= total {
                return Err(err("InvalidRange"));
            }
            let body = object.data.slice(start as usize..(end + 1) as usize);
            return Ok(GetObjectOutput {
                body,
                content_length: end - start + 1,
                content_range: Some(format!("bytes {}-{}/{}", start, end, total)),
                e_tag: Some(object.e_tag),
                parts_count: None,
            });
        }

        Ok(GetObjectOutput {
            body: object.data.clone(),
            content_length: total,
            content_range: None,
            e_tag: Some(object.e_tag),
            parts_count: None,
        })
    }

    async fn list_objects_v2(&self, input: ListObjectsInput) -> ClientResult<ListObjectsPage> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(CallRecord::ListObjectsV2 {
            prefix: input.prefix.clone(),
        });

        let page_size = input
            .max_keys
            .map(|n| n.max(1) as usize)
            .or(state.page_size)
            .unwrap_or(1000);

        let matching: Vec<ObjectSummary> = state
            .objects
            .iter()
            .filter(|((bucket, key), _)| {
                *bucket == input.bucket
                    && input
                        .prefix
                        .as_deref()
                        .map_or(true, |prefix| key.starts_with(prefix))
            })
            .filter(|((_, key), _)| {
                input
                    .continuation_token
                    .as_deref()
                    .map_or(true, |token| key.as_str() > token)
            })
            .map(|((_, key), object)| ObjectSummary {
                key: key.clone(),
                size: object.data.len() as u64,
                e_tag: Some(object.e_tag.clone()),
            })
            .collect();

        let is_truncated = matching.len() > page_size;
        let objects: Vec<ObjectSummary> = matching.into_iter().take(page_size).collect();
        let next_continuation_token = if is_truncated {
            objects.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ListObjectsPage {
            objects,
            next_continuation_token,
            is_truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_part_number_get_on_plain_object() {
        let client = InMemoryObjectClient::new();
        client.insert_object("b", "k", Bytes::from_static(b"hello"));

        let output = client
            .get_object(GetObjectInput {
                bucket: "b".into(),
                key: "k".into(),
                part_number: Some(1),
                ..GetObjectInput::default()
            })
            .await
            .unwrap();

        assert_eq!(&output.body[..], b"hello");
        assert_eq!(output.parts_count, Some(1));
        assert_eq!(output.content_range.as_deref(), Some("bytes 0-4/5"));
    }

    #[tokio::test]
    async fn test_ranged_get_clamps_to_object_end() {
        let client = InMemoryObjectClient::new();
        client.insert_object("b", "k", Bytes::from_static(b"0123456789"));

        let output = client
            .get_object(GetObjectInput {
                bucket: "b".into(),
                key: "k".into(),
                range: Some("bytes=5-100".into()),
                ..GetObjectInput::default()
            })
            .await
            .unwrap();

        assert_eq!(&output.body[..], b"56789");
        assert_eq!(output.content_range.as_deref(), Some("bytes 5-9/10"));
    }

    #[tokio::test]
    async fn test_if_match_mismatch_fails() {
        let client = InMemoryObjectClient::new();
        client.insert_object("b", "k", Bytes::from_static(b"x"));

        let result = client
            .get_object(GetObjectInput {
                bucket: "b".into(),
                key: "k".into(),
                if_match: Some("\"stale\"".into()),
                ..GetObjectInput::default()
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_multipart_lifecycle() {
        let client = InMemoryObjectClient::new();

        let upload = client
            .create_multipart_upload(CreateMultipartUploadInput {
                bucket: "b".into(),
                key: "k".into(),
                content_type: None,
                metadata: Default::default(),
                checksum_algorithm: None,
                checksum_type: Default::default(),
            })
            .await
            .unwrap();

        let mut parts = Vec::new();
        for (number, data) in [(1, &b"aa"[..]), (2, &b"bb"[..])] {
            let output = client
                .upload_part(UploadPartInput {
                    bucket: "b".into(),
                    key: "k".into(),
                    upload_id: upload.upload_id.clone(),
                    part_number: number,
                    body: Bytes::from_static(data),
                    checksum_algorithm: None,
                })
                .await
                .unwrap();
            parts.push(super::super::CompletedPart {
                part_number: number,
                e_tag: output.e_tag,
                checksum: None,
            });
        }

        client
            .complete_multipart_upload(CompleteMultipartUploadInput {
                bucket: "b".into(),
                key: "k".into(),
                upload_id: upload.upload_id,
                parts,
                checksum_algorithm: None,
                full_object_checksum: None,
            })
            .await
            .unwrap();

        assert_eq!(client.object("b", "k").unwrap(), Bytes::from_static(b"aabb"));
        assert_eq!(client.active_upload_count(), 0);
    }

    #[tokio::test]
    async fn test_listing_paginates() {
        let client = InMemoryObjectClient::new();
        for i in 0..5 {
            client.insert_object("b", format!("k{i}"), Bytes::from_static(b"x"));
        }
        client.set_page_size(2);

        let mut keys = Vec::new();
        let mut token = None;
        loop {
            let page = client
                .list_objects_v2(ListObjectsInput {
                    bucket: "b".into(),
                    prefix: None,
                    continuation_token: token.take(),
                    max_keys: None,
                })
                .await
                .unwrap();
            keys.extend(page.objects.iter().map(|o| o.key.clone()));
            if !page.is_truncated {
                break;
            }
            token = page.next_continuation_token;
        }

        assert_eq!(keys, vec!["k0", "k1", "k2", "k3", "k4"]);
    }
}
