//! multipart/form-data decoding
//!
//! Decodes a fully buffered request body into text fields and uploaded files
//! using `multer`. Decoding is lenient: parts without a `name` are dropped,
//! a repeated name keeps the last part, and a structural error ends decoding
//! with whatever was collected up to that point.

use std::collections::HashMap;
use std::convert::Infallible;

use bytes::Bytes;
use futures::stream;
use multer::Multipart;
use thiserror::Error;
use tracing::debug;

/// A file part, owned by the request that carried it
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_filename: String,
    pub mime_type: String,
    pub size_bytes: usize,
    pub raw_bytes: Bytes,
}

/// Decoded form: text fields and files, both keyed by field name
#[derive(Debug, Default)]
pub struct ParsedForm {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, UploadedFile>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MultipartError {
    #[error("No multipart boundary found in Content-Type header")]
    MissingBoundary,
}

/// Extract the boundary token from a `multipart/form-data` Content-Type
pub fn parse_boundary(content_type: &str) -> Result<String, MultipartError> {
    multer::parse_boundary(content_type).map_err(|e| {
        debug!("Rejecting Content-Type '{}': {}", content_type, e);
        MultipartError::MissingBoundary
    })
}

/// Decode a buffered multipart body
///
/// A part counts as a file only when it carries a non-empty `filename` and
/// its own `Content-Type`; every other named part is a text field.
pub async fn parse_form_data(body: Bytes, boundary: &str) -> ParsedForm {
    let body_stream = stream::once(async move { Ok::<Bytes, Infallible>(body) });
    let mut multipart = Multipart::new(body_stream, boundary);
    let mut form = ParsedForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                debug!("Stopping multipart decoding: {}", e);
                break;
            }
        };

        let Some(name) = field.name().map(str::to_string) else {
            debug!("Dropping multipart part without a name");
            continue;
        };
        let file_name = field
            .file_name()
            .filter(|f| !f.is_empty())
            .map(str::to_string);
        let mime_type = field.content_type().map(|m| m.to_string());

        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => {
                debug!("Stopping multipart decoding in part '{}': {}", name, e);
                break;
            }
        };

        match (file_name, mime_type) {
            (Some(original_filename), Some(mime_type)) => {
                form.files.insert(
                    name,
                    UploadedFile {
                        original_filename,
                        mime_type,
                        size_bytes: data.len(),
                        raw_bytes: data,
                    },
                );
            }
            _ => {
                form.fields
                    .insert(name, String::from_utf8_lossy(&data).into_owned());
            }
        }
    }

    form
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDARY: &str = "----formboundary7MA4YWxk";

    enum Part<'a> {
        Field(&'a str, &'a str),
        File(&'a str, &'a str, &'a str, &'a [u8]),
        Raw(&'a str, &'a [u8]),
    }

    fn body(parts: &[Part<'_>]) -> Bytes {
        let mut out = Vec::new();
        for part in parts {
            out.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match part {
                Part::Field(name, value) => {
                    out.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                            .as_bytes(),
                    );
                    out.extend_from_slice(value.as_bytes());
                }
                Part::File(name, filename, mime, data) => {
                    out.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                            name, filename, mime
                        )
                        .as_bytes(),
                    );
                    out.extend_from_slice(data);
                }
                Part::Raw(headers, data) => {
                    out.extend_from_slice(headers.as_bytes());
                    out.extend_from_slice(b"\r\n\r\n");
                    out.extend_from_slice(data);
                }
            }
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        Bytes::from(out)
    }

    fn binary_payload() -> Vec<u8> {
        let mut data: Vec<u8> = (0..=255u8).collect();
        data.extend_from_slice(b"\r\n\r\n--not-the-boundary\r\n");
        data.extend_from_slice(&[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10]);
        data
    }

    #[test]
    fn test_parse_boundary() {
        let boundary = parse_boundary(&format!("multipart/form-data; boundary={}", BOUNDARY));
        assert_eq!(boundary.unwrap(), BOUNDARY);
    }

    #[test]
    fn test_parse_boundary_missing() {
        assert_eq!(
            parse_boundary("multipart/form-data"),
            Err(MultipartError::MissingBoundary)
        );
        assert_eq!(parse_boundary(""), Err(MultipartError::MissingBoundary));
        assert_eq!(
            parse_boundary("application/json"),
            Err(MultipartError::MissingBoundary)
        );
    }

    #[tokio::test]
    async fn test_file_and_fields_round_trip() {
        let payload = binary_payload();
        let form = parse_form_data(
            body(&[
                Part::Field("userId", "user-42"),
                Part::File("file", "holiday.jpg", "image/jpeg", &payload),
                Part::Field("caption", "sunset at the pier"),
            ]),
            BOUNDARY,
        )
        .await;

        assert_eq!(form.fields.len(), 2);
        assert_eq!(form.fields["userId"], "user-42");
        assert_eq!(form.fields["caption"], "sunset at the pier");

        let file = &form.files["file"];
        assert_eq!(file.original_filename, "holiday.jpg");
        assert_eq!(file.mime_type, "image/jpeg");
        assert_eq!(file.size_bytes, payload.len());
        assert_eq!(file.raw_bytes.as_ref(), payload.as_slice());
    }

    #[tokio::test]
    async fn test_part_without_filename_is_a_field() {
        let form = parse_form_data(
            body(&[Part::Raw(
                "Content-Disposition: form-data; name=\"file\"\r\nContent-Type: image/png",
                b"not really a file",
            )]),
            BOUNDARY,
        )
        .await;

        assert!(form.files.is_empty());
        assert_eq!(form.fields["file"], "not really a file");
    }

    #[tokio::test]
    async fn test_part_without_content_type_is_a_field() {
        let form = parse_form_data(
            body(&[Part::Raw(
                "Content-Disposition: form-data; name=\"file\"; filename=\"a.png\"",
                b"abc",
            )]),
            BOUNDARY,
        )
        .await;

        assert!(form.files.is_empty());
        assert_eq!(form.fields["file"], "abc");
    }

    #[tokio::test]
    async fn test_part_without_name_is_dropped() {
        let form = parse_form_data(
            body(&[
                Part::Raw("Content-Disposition: form-data", b"orphan"),
                Part::Field("userId", "u1"),
            ]),
            BOUNDARY,
        )
        .await;

        assert_eq!(form.fields.len(), 1);
        assert_eq!(form.fields["userId"], "u1");
        assert!(form.files.is_empty());
    }

    #[tokio::test]
    async fn test_empty_and_blank_bodies_yield_empty_form() {
        for raw in [&b""[..], &b"   \r\n  "[..]] {
            let form = parse_form_data(Bytes::copy_from_slice(raw), BOUNDARY).await;
            assert!(form.fields.is_empty());
            assert!(form.files.is_empty());
        }
    }

    #[tokio::test]
    async fn test_repeated_names_keep_last_part() {
        let form = parse_form_data(
            body(&[
                Part::Field("userId", "first"),
                Part::File("file", "one.png", "image/png", b"1"),
                Part::Field("userId", "second"),
                Part::File("file", "two.png", "image/png", b"22"),
            ]),
            BOUNDARY,
        )
        .await;

        assert_eq!(form.fields["userId"], "second");
        assert_eq!(form.files.len(), 1);
        assert_eq!(form.files["file"].original_filename, "two.png");
        assert_eq!(form.files["file"].size_bytes, 2);
    }

    #[tokio::test]
    async fn test_truncated_body_keeps_completed_parts() {
        let raw = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"userId\"\r\n\r\nu1\r\n--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.png\"\r\nContent-Type: image/png\r\n\r\npartial",
            b = BOUNDARY
        )
        .into_bytes();

        let form = parse_form_data(Bytes::from(raw), BOUNDARY).await;

        assert_eq!(form.fields["userId"], "u1");
        assert!(form.files.is_empty());
    }
}
