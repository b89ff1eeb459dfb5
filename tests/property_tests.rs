/// Property-based tests using proptest
/// Tests invariants that should hold for all inputs
use chrono::{NaiveDate, NaiveDateTime};
use mni_mtom_client::codec::{self, SourceEncoding};
use mni_mtom_client::envelope::{EnvelopeBuilder, MniVersion};
use mni_mtom_client::hasher::{digest_password, sha256_hex, DigestCase};
use mni_mtom_client::models::{Credentials, Petition};
use mni_mtom_client::multipart;
use proptest::prelude::*;
use std::collections::HashMap;

fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    (2000i32..2100, 1u32..=12, 1u32..=28)
        .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

fn fixed_now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 15)
        .unwrap()
        .and_hms_opt(10, 30, 0)
        .unwrap()
}

// Property: password digest is a deterministic function of (password, date)
proptest! {
    #[test]
    fn digest_is_deterministic(raw in "\\PC{0,40}", date in date_strategy()) {
        let a = digest_password(&raw, date, DigestCase::Lower);
        let b = digest_password(&raw, date, DigestCase::Lower);
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.len(), 64);
    }

    #[test]
    fn digest_case_only_changes_letter_case(raw in "\\PC{0,40}", date in date_strategy()) {
        let lower = digest_password(&raw, date, DigestCase::Lower);
        let upper = digest_password(&raw, date, DigestCase::Upper);
        prop_assert_eq!(lower.to_uppercase(), upper.clone());
        prop_assert!(lower.chars().all(|c| !c.is_ascii_uppercase()));
        prop_assert!(upper.chars().all(|c| !c.is_ascii_lowercase()));
    }

    #[test]
    fn digest_is_salted_by_date(raw in "[a-z0-9]{1,20}", d1 in date_strategy(), d2 in date_strategy()) {
        prop_assume!(d1 != d2);
        prop_assert_ne!(
            digest_password(&raw, d1, DigestCase::Lower),
            digest_password(&raw, d2, DigestCase::Lower)
        );
    }
}

// Property: base64 normalization
proptest! {
    #[test]
    fn raw_bytes_survive_encode_decode(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let encoded = codec::to_base64(&bytes, SourceEncoding::Raw);
        prop_assert_eq!(codec::decode(&encoded).unwrap(), bytes);
    }

    #[test]
    fn base64_input_is_passed_through(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let encoded = codec::to_base64(&bytes, SourceEncoding::Raw);
        let again = codec::to_base64(encoded.as_bytes(), SourceEncoding::Base64);
        prop_assert_eq!(again, encoded);
    }

    #[test]
    fn decode_never_panics(text in "\\PC*") {
        let _ = codec::decode(&text);
    }
}

// Property: a well-formed multipart body splits back into its parts
proptest! {
    #[test]
    fn multipart_split_recovers_parts(
        specs in prop::collection::vec(
            (prop::collection::vec(any::<u8>(), 0..300), any::<bool>(), any::<bool>()),
            1..6
        )
    ) {
        let boundary = "uuid:7d1f3c2a-proptest";
        let mut raw = Vec::new();
        let mut expected_headers = Vec::new();
        for (i, (body, lowercase, transfer_encoding)) in specs.iter().enumerate() {
            let mut headers: Vec<(String, String)> = vec![
                ("Content-Type".to_string(), "application/octet-stream".to_string()),
                (
                    if *lowercase { "content-id" } else { "Content-ID" }.to_string(),
                    format!("<part{}@mni>", i),
                ),
            ];
            if *transfer_encoding {
                headers.push(("Content-Transfer-Encoding".to_string(), "binary".to_string()));
            }

            raw.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
            for (name, value) in &headers {
                raw.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
            }
            raw.extend_from_slice(b"\r\n");
            raw.extend_from_slice(body);
            raw.extend_from_slice(b"\r\n");
            expected_headers.push(headers.into_iter().collect::<HashMap<String, String>>());
        }
        raw.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

        let content_type = format!(r#"multipart/related; type="application/xop+xml"; boundary="{}""#, boundary);
        let parts = multipart::split(&raw, &content_type).unwrap();

        prop_assert_eq!(parts.len(), specs.len());
        for (i, part) in parts.iter().enumerate() {
            prop_assert_eq!(&part.body, &specs[i].0);
            prop_assert_eq!(&part.headers, &expected_headers[i]);
            let expected_id = format!("part{}@mni", i);
            prop_assert_eq!(part.content_id(), Some(expected_id.as_str()));
        }
    }

    #[test]
    fn multipart_split_never_panics(body in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = multipart::split(&body, "multipart/related; boundary=abc");
    }
}

// Property: petitions always carry the hash of their raw bytes
proptest! {
    #[test]
    fn petition_hash_matches_content(
        content in prop::collection::vec(any::<u8>(), 1..512),
        v3 in any::<bool>()
    ) {
        let version = if v3 { MniVersion::V3_0 } else { MniVersion::V2_2 };
        let builder = EnvelopeBuilder::new(version, "http://localhost/mni", DigestCase::Lower);
        let petition = Petition {
            document_type_code: "13".to_string(),
            content_bytes: content.clone(),
            file_name: "doc.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            description: None,
            attorney_id: None,
        };
        let request = builder.build_petition_request(
            &Credentials::new("user", "pass"),
            "50000011220248240001",
            &petition,
            fixed_now(),
        );

        let expected_hash = format!(r#"hash="{}""#, sha256_hex(&content));
        prop_assert!(request.body().contains(&expected_hash));
        prop_assert!(!request.body().contains("pass<"));
    }
}
