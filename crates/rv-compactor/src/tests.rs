use crate::*;
use crate::layer1_preprocess;
use crate::layer2_dictionary::{self, token_for, to_base36};
use crate::layer3_binary;
use crate::pipeline::{checksum, compression_ratio, verify_checksum};
use proptest::prelude::*;
use rv_core::clock::ManualClock;
use rv_core::config::{CompressionConfig, DictionaryConfig};
use rv_core::error::{DecompressionStage, RvError};
use rv_core::types::{Algorithm, CompressionLevel};
use std::sync::Arc;

fn code_corpus(min_bytes: usize) -> String {
    let mut text = String::with_capacity(min_bytes + 256);
    let mut i = 0;
    while text.len() <= min_bytes {
        text.push_str(&format!(
            "export async function handler{i}(req, res) {{\n  const value = req.body.items[{i}];\n  console.log(\"handled\", value);\n  return res.json({{ ok: true, value }});\n}}\n\n"
        ));
        i += 1;
    }
    text
}

fn small_threshold(threshold: usize) -> CompressionPipeline {
    CompressionPipeline::new(CompressionConfig {
        extreme_threshold_bytes: threshold,
        ..CompressionConfig::default()
    })
}

fn is_stage(err: &RvError, expected: DecompressionStage) -> bool {
    matches!(err, RvError::DecompressionStageFailure { stage } if *stage == expected)
}

// ========== Layer 1: Preprocess ==========

#[test]
fn test_l1_collapse_spaces() {
    assert_eq!(layer1_preprocess::preprocess("a    b\t\tc"), "a b c");
}

#[test]
fn test_l1_collapse_blank_lines() {
    assert_eq!(layer1_preprocess::preprocess("a\n\n\n\nb"), "a\nb");
    assert_eq!(layer1_preprocess::preprocess("a\n  \n\t\nb"), "a\nb");
}

#[test]
fn test_l1_line_comment() {
    let out = layer1_preprocess::preprocess("let x = 1; // note\nlet y = 2;");
    assert!(!out.contains("note"));
    assert!(out.contains("let x = 1;"));
    assert!(out.contains("let y = 2;"));
}

#[test]
fn test_l1_block_comment() {
    assert_eq!(layer1_preprocess::preprocess("a /* multi\nline */ b"), "a b");
}

#[test]
fn test_l1_comment_inside_string_is_stripped() {
    // Not a lexer: the URL loses everything after `//`.
    assert_eq!(layer1_preprocess::preprocess("see https://example.com"), "see https:");
}

#[test]
fn test_l1_quotes() {
    let out = layer1_preprocess::preprocess("\u{201C}hi\u{201D} \u{2018}x\u{2019}");
    assert_eq!(out, "\"hi\" 'x'");
}

#[test]
fn test_l1_trim_and_empty() {
    assert_eq!(layer1_preprocess::preprocess("  hello  "), "hello");
    assert_eq!(layer1_preprocess::preprocess(""), "");
    assert_eq!(layer1_preprocess::preprocess(" \n\t "), "");
}

#[test]
fn test_l1_postprocess_identity() {
    assert_eq!(layer1_preprocess::postprocess("x  y".to_string()), "x  y");
}

// ========== Layer 2: Dictionary ==========

#[test]
fn test_l2_base36() {
    assert_eq!(to_base36(0), "0");
    assert_eq!(to_base36(35), "z");
    assert_eq!(to_base36(36), "10");
    assert_eq!(to_base36(1295), "zz");
}

#[test]
fn test_l2_token_shape() {
    assert_eq!(token_for(0), "\u{1A}0\u{1A}");
    assert_eq!(token_for(37), "\u{1A}11\u{1A}");
}

#[test]
fn test_l2_keyword_threshold() {
    let four = "function a() {} function b() {} function c() {} function d() {}";
    let three = "function a() {} function b() {} function c() {}";
    assert!(layer2_dictionary::keyword_candidates(four, 3).contains(&"function".to_string()));
    assert!(!layer2_dictionary::keyword_candidates(three, 3).contains(&"function".to_string()));
}

#[test]
fn test_l2_repeated_substrings() {
    let text = "abcdefgh ".repeat(5);
    let subs = layer2_dictionary::repeated_substrings(&text, &DictionaryConfig::default());
    assert!(subs.iter().any(|(s, c)| s == "abcdefgh " && *c == 5));
    // Same-count prefixes are shadowed by the longer phrase.
    assert!(!subs.iter().any(|(s, _)| s == "abcd"));
}

#[test]
fn test_l2_repeated_substrings_threshold() {
    let subs = layer2_dictionary::repeated_substrings("wxyz1 qrst2", &DictionaryConfig::default());
    assert!(subs.is_empty());
}

#[test]
fn test_l2_scan_window_char_boundary() {
    let cfg = DictionaryConfig { scan_window_bytes: 3, ..DictionaryConfig::default() };
    let text = "é".repeat(100);
    let subs = layer2_dictionary::repeated_substrings(&text, &cfg);
    assert!(subs.is_empty());
}

#[test]
fn test_l2_candidate_cap() {
    let cfg = DictionaryConfig { max_substring_candidates: 3, ..DictionaryConfig::default() };
    let text = code_corpus(4096);
    let subs = layer2_dictionary::repeated_substrings(&text, &cfg);
    assert!(subs.len() <= 3);
}

#[test]
fn test_l2_skips_phrases_not_longer_than_token() {
    let dict = layer2_dictionary::build_dictionary("fn fn fn fn fn fn", &DictionaryConfig::default());
    assert!(dict.iter().all(|(_, phrase)| phrase != "fn "));
}

#[test]
fn test_l2_json_escaped_len_matches_serde() {
    let (t0, t1) = (token_for(0), token_for(1295));
    for s in ["", "null", "a\"b\\c", "line\n\ttab", "\u{1A}", "é€", t0.as_str(), t1.as_str()] {
        assert_eq!(layer2_dictionary::json_escaped_len(s), serde_json::to_string(s).unwrap().len() - 2, "{s:?}");
    }
    assert_eq!(layer2_dictionary::json_escaped_len(&token_for(0)), 13);
}

#[test]
fn test_l2_short_phrases_skipped_in_envelope_terms() {
    let text = "null, true, false, null, true, false, ".repeat(20);
    let dict = layer2_dictionary::build_dictionary(&text, &DictionaryConfig::default());
    for (token, phrase) in dict.iter() {
        assert!(
            layer2_dictionary::json_escaped_len(phrase) > layer2_dictionary::json_escaped_len(token),
            "{phrase:?} is not longer than its token"
        );
    }
    assert!(dict.iter().all(|(_, phrase)| !matches!(phrase, "null" | "true" | "false")));
}

#[test]
fn test_l2_substitution_shrinks_json_envelope() {
    let text = code_corpus(8 * 1024);
    let (out, dict) = layer2_dictionary::compress(&text);
    let before = serde_json::to_string(&text).unwrap().len();
    let after = serde_json::to_string(&out).unwrap().len() + serde_json::to_string(&dict).unwrap().len();
    assert!(after < before, "envelope grew: {after} >= {before}");
}

#[test]
fn test_l2_substitute_prunes_unused() {
    let mut dict = Dictionary::new();
    dict.insert(token_for(0), "hello world".into());
    dict.insert(token_for(1), "never used phrase".into());
    let (out, dict) = layer2_dictionary::substitute("say hello world", dict);
    assert_eq!(out, format!("say {}", token_for(0)));
    assert_eq!(dict.len(), 1);
    assert_eq!(dict.get(&token_for(0)), Some("hello world"));
}

#[test]
fn test_l2_longest_phrase_wins() {
    let mut dict = Dictionary::new();
    dict.insert(token_for(0), "abc def".into());
    dict.insert(token_for(1), "abc".into());
    let (out, dict) = layer2_dictionary::substitute("abc def abc", dict);
    assert_eq!(out, format!("{} {}", token_for(0), token_for(1)));
    assert_eq!(layer2_dictionary::decompress(&out, &dict).unwrap(), "abc def abc");
}

#[test]
fn test_l2_roundtrip_code() {
    let text = code_corpus(8 * 1024);
    let (out, dict) = layer2_dictionary::compress(&text);
    assert!(!dict.is_empty());
    assert!(out.len() < text.len());
    assert_eq!(layer2_dictionary::decompress(&out, &dict).unwrap(), text);
}

#[test]
fn test_l2_roundtrip_delimiters() {
    for text in ["\u{1A}", "\u{1A}\u{1A}\u{1A}", "a\u{1A}b", "\u{1A}0\u{1A}", ""] {
        let (out, dict) = layer2_dictionary::compress(text);
        assert_eq!(layer2_dictionary::decompress(&out, &dict).unwrap(), text);
    }
}

#[test]
fn test_l2_adversarial_token_literals() {
    let mut text = String::new();
    for i in 0..20 {
        text.push_str(&format!("function handler{i}() {{ return {}; }}\n", token_for(i)));
    }
    let (out, dict) = layer2_dictionary::compress(&text);
    assert!(!dict.is_empty());
    assert_eq!(layer2_dictionary::decompress(&out, &dict).unwrap(), text);
}

#[test]
fn test_l2_unknown_token() {
    let err = layer2_dictionary::decompress("a\u{1A}5\u{1A}", &Dictionary::new()).unwrap_err();
    assert!(matches!(err, RvError::CorruptPayload(_)));
}

#[test]
fn test_l2_unterminated_token() {
    let err = layer2_dictionary::decompress("a\u{1A}0", &Dictionary::new()).unwrap_err();
    assert!(matches!(err, RvError::CorruptPayload(_)));
}

#[test]
fn test_l2_dictionary_json_is_object() {
    let mut dict = Dictionary::new();
    dict.insert(token_for(0), "hello world".into());
    let json = serde_json::to_value(&dict).unwrap();
    assert_eq!(json[token_for(0)], "hello world");
}

// ========== Layer 3: Binary ==========

#[test]
fn test_l3_roundtrip() {
    let mut dict = Dictionary::new();
    dict.insert(token_for(0), "console.log(".into());
    let text = format!("{}\"x\");", token_for(0));
    let blob = layer3_binary::compress(&text, &dict).unwrap();
    let (back, back_dict) = layer3_binary::decompress(&blob).unwrap();
    assert_eq!(back, text);
    assert_eq!(back_dict, dict);
}

#[test]
fn test_l3_empty_text() {
    let blob = layer3_binary::compress("", &Dictionary::new()).unwrap();
    let (back, dict) = layer3_binary::decompress(&blob).unwrap();
    assert_eq!(back, "");
    assert!(dict.is_empty());
}

#[test]
fn test_l3_garbage_fails_inflate() {
    let err = layer3_binary::decompress(b"not zlib at all").unwrap_err();
    assert!(is_stage(&err, DecompressionStage::Inflate));
}

#[test]
fn test_l3_empty_inflate() {
    let blob = layer3_binary::deflate(b"", 9).unwrap();
    let err = layer3_binary::decompress(&blob).unwrap_err();
    assert!(is_stage(&err, DecompressionStage::Inflate));
}

#[test]
fn test_l3_bad_lz_block() {
    let blob = layer3_binary::deflate(&[4, 0, 0, 0, 0x50], 9).unwrap();
    let err = layer3_binary::decompress(&blob).unwrap_err();
    assert!(is_stage(&err, DecompressionStage::LzDecompress));
}

#[test]
fn test_l3_empty_lz_output() {
    let blob = layer3_binary::deflate(&lz4_flex::compress_prepend_size(b""), 9).unwrap();
    let err = layer3_binary::decompress(&blob).unwrap_err();
    assert!(is_stage(&err, DecompressionStage::LzDecompress));
}

#[test]
fn test_l3_corrupt_payloads() {
    let payloads: [&[u8]; 6] = [
        b"undefined",
        b"   \n",
        b"{\"dictionary\":{}}",
        b"{\"text\":5}",
        b"[1,2]",
        &[0xff, 0xfe],
    ];
    for payload in payloads {
        let blob = layer3_binary::deflate(&lz4_flex::compress_prepend_size(payload), 9).unwrap();
        let err = layer3_binary::decompress(&blob).unwrap_err();
        assert!(matches!(err, RvError::CorruptPayload(_)), "payload {payload:?} gave {err}");
    }
}

#[test]
fn test_l3_envelope_limit() {
    let mut dict = Dictionary::new();
    dict.insert(token_for(0), "console.log(".into());
    let text = "x".repeat(200);
    let err = layer3_binary::compress_with_limit(&text, &dict, Some(64)).unwrap_err();
    assert!(matches!(err, RvError::Compression(_)));

    let blob = layer3_binary::compress_with_limit(&text, &dict, Some(4096)).unwrap();
    let (back, back_dict) = layer3_binary::decompress(&blob).unwrap();
    assert_eq!(back, text);
    assert_eq!(back_dict, dict);
}

#[test]
fn test_l3_deflate_inflate() {
    let data = b"hello hello hello hello".to_vec();
    let blob = layer3_binary::deflate(&data, 6).unwrap();
    assert_eq!(layer3_binary::inflate(&blob).unwrap(), data);
}

// ========== Storage codec ==========

#[test]
fn test_storage_empty() {
    assert_eq!(to_storable(&[]), "");
    assert!(from_storable("").unwrap().is_empty());
}

#[test]
fn test_storage_all_bytes() {
    let bytes: Vec<u8> = (0..=255u8).collect();
    let text = to_storable(&bytes);
    assert!(text.is_ascii());
    assert_eq!(from_storable(&text).unwrap(), bytes);
}

#[test]
fn test_storage_invalid() {
    let err = from_storable("not*base64!").unwrap_err();
    assert!(matches!(err, RvError::CorruptPayload(_)));
}

#[test]
fn test_storage_serde_adapter() {
    #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
    struct Holder {
        #[serde(default, with = "crate::storage_codec::serde_base64")]
        raw: Option<Vec<u8>>,
    }
    let h = Holder { raw: Some(vec![0, 1, 254, 255]) };
    let json = serde_json::to_string(&h).unwrap();
    assert_eq!(json, r#"{"raw":"AAH+/w=="}"#);
    assert_eq!(serde_json::from_str::<Holder>(&json).unwrap(), h);
    let none: Holder = serde_json::from_str("{}").unwrap();
    assert_eq!(none.raw, None);
}

// ========== Pipeline ==========

#[test]
fn test_pipeline_small_is_deflate() {
    let result = compress_auto("console.log(\"Hello World\");").unwrap();
    assert_eq!(result.algorithm, Algorithm::Deflate);
    assert_eq!(result.metadata.algorithm, Algorithm::Deflate);
    assert_eq!(result.metadata.level, CompressionLevel::Balanced);
    assert_eq!(result.compressed_size, result.compressed_data.len() as u64);
    assert_eq!(result.metadata.checksum.as_deref(), Some(checksum(&result.compressed_data).as_str()));
    let back = decompress_auto(&result.compressed_data, &result.metadata).unwrap();
    assert_eq!(back, "console.log(\"Hello World\");");
}

#[test]
fn test_pipeline_empty_string() {
    let result = compress_auto("").unwrap();
    assert_eq!(result.original_size, 0);
    assert!(result.compressed_size > 0);
    assert_eq!(result.compression_ratio, 0.0);
    assert_eq!(decompress_auto(&result.compressed_data, &result.metadata).unwrap(), "");
}

#[test]
fn test_pipeline_large_is_extreme() {
    let text = code_corpus(110 * 1024);
    let result = compress_auto(&text).unwrap();
    assert_eq!(result.algorithm, Algorithm::ExtremeMultiStage);
    assert_eq!(result.metadata.level, CompressionLevel::Maximum);
    assert!(result.compression_ratio > 1.0);
    assert_eq!(decompress_auto(&result.compressed_data, &result.metadata).unwrap(), text);
}

#[test]
fn test_pipeline_large_with_delimiters_and_comments() {
    let mut text = code_corpus(105 * 1024);
    text.push_str("// trailing comment\n\u{1A}\u{1A}0\u{1A}   spaced    out  \n\n\n");
    let result = compress_auto(&text).unwrap();
    assert_eq!(result.algorithm, Algorithm::ExtremeMultiStage);
    assert_eq!(decompress_auto(&result.compressed_data, &result.metadata).unwrap(), text);
}

#[test]
fn test_pipeline_preprocess_is_lossy() {
    let pipeline = CompressionPipeline::new(CompressionConfig {
        extreme_threshold_bytes: 64,
        preprocess: true,
        ..CompressionConfig::default()
    });
    let text = "/* header */\nconst a = 1;    // one\n\n\nconst b = 2;\n".repeat(4);
    let result = pipeline.compress_auto(&text).unwrap();
    assert_eq!(result.algorithm, Algorithm::ExtremeMultiStage);
    let back = pipeline.decompress_auto(&result.compressed_data, &result.metadata).unwrap();
    assert_eq!(back, layer1_preprocess::preprocess(&text));
    assert_ne!(back, text);
}

#[test]
fn test_pipeline_threshold_boundary() {
    let pipeline = small_threshold(64);
    let at = pipeline.compress_auto(&"a".repeat(64)).unwrap();
    assert_eq!(at.algorithm, Algorithm::Deflate);
    let above = pipeline.compress_auto(&"a".repeat(65)).unwrap();
    assert_eq!(above.algorithm, Algorithm::ExtremeMultiStage);
    let back = pipeline.decompress_auto(&above.compressed_data, &above.metadata).unwrap();
    assert_eq!(back, "a".repeat(65));
}

#[test]
fn test_pipeline_threshold_counts_utf8_bytes() {
    let pipeline = small_threshold(64);
    // 40 chars, 80 bytes.
    let text = "é".repeat(40);
    let result = pipeline.compress_auto(&text).unwrap();
    assert_eq!(result.original_size, 80);
    assert_eq!(result.algorithm, Algorithm::ExtremeMultiStage);
}

#[test]
fn test_pipeline_mistagged_deflate_blob_falls_back() {
    let result = compress_auto("plain small text").unwrap();
    let mut meta = result.metadata.clone();
    meta.algorithm = Algorithm::ExtremeMultiStage;
    assert_eq!(decompress_auto(&result.compressed_data, &meta).unwrap(), "plain small text");
}

#[test]
fn test_pipeline_garbage_fails() {
    let result = compress_auto("something").unwrap();
    let mut meta = result.metadata.clone();
    meta.algorithm = Algorithm::ExtremeMultiStage;
    let err = decompress_auto(b"garbage bytes", &meta).unwrap_err();
    assert!(err.is_corruption());
    meta.algorithm = Algorithm::Deflate;
    let err = decompress_auto(b"garbage bytes", &meta).unwrap_err();
    assert!(is_stage(&err, DecompressionStage::Inflate));
}

#[test]
fn test_pipeline_non_utf8_bytes() {
    let pipeline = small_threshold(4);
    let data = vec![0xff, 0x00, 0xfe, 0x01, 0xff, 0x00, 0xfe, 0x01];
    let result = pipeline.compress_auto_bytes(&data).unwrap();
    assert_eq!(result.algorithm, Algorithm::Deflate);
    let back = pipeline.decompress_auto_bytes(&result.compressed_data, &result.metadata).unwrap();
    assert_eq!(back, data);
}

#[test]
fn test_pipeline_clock_timestamp() {
    let pipeline = CompressionPipeline::with_clock(CompressionConfig::default(), Arc::new(ManualClock::new(42)));
    let result = pipeline.compress_auto("x").unwrap();
    assert_eq!(result.metadata.timestamp, 42);
}

#[test]
fn test_pipeline_multi_stage_failure_falls_back_to_deflate() {
    let pipeline = CompressionPipeline::new(CompressionConfig {
        max_envelope_bytes: Some(1024),
        ..CompressionConfig::default()
    });
    let text = code_corpus(110 * 1024);
    let result = pipeline.compress_auto(&text).unwrap();
    assert_eq!(result.algorithm, Algorithm::Deflate);
    assert_eq!(result.metadata.algorithm, Algorithm::Deflate);
    assert_eq!(result.metadata.level, CompressionLevel::Balanced);
    assert_eq!(result.original_size, text.len() as u64);
    assert_eq!(pipeline.decompress_auto(&result.compressed_data, &result.metadata).unwrap(), text);
    // Default pipeline decodes it too: the tag alone selects the decoder.
    assert_eq!(decompress_auto(&result.compressed_data, &result.metadata).unwrap(), text);
}

#[test]
fn test_pipeline_fallback_level() {
    let pipeline = CompressionPipeline::new(CompressionConfig { fallback_level: 1, ..CompressionConfig::default() });
    let result = pipeline.compress_auto("abc").unwrap();
    assert_eq!(result.metadata.level, CompressionLevel::Fast);
}

#[test]
fn test_ratio_guard() {
    assert_eq!(compression_ratio(10, 0), 0.0);
    assert_eq!(compression_ratio(10, 4), 2.5);
}

#[test]
fn test_verify_checksum() {
    let result = compress_auto("checked").unwrap();
    assert!(verify_checksum(&result.compressed_data, &result.metadata).is_ok());
    let err = verify_checksum(b"tampered", &result.metadata).unwrap_err();
    assert!(matches!(err, RvError::CorruptPayload(_)));
    let mut meta = result.metadata.clone();
    meta.checksum = None;
    assert!(verify_checksum(b"tampered", &meta).is_ok());
}

// ========== Properties ==========

fn fragment_string() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop::sample::select(vec![
            "function ", "\u{1A}", "return ", "\u{1A}0\u{1A}", "x", "ab", " ", "\n",
            "console.log(", "é", "const ", "\u{1A}\u{1A}", "{}", "abcdefgh",
        ]),
        0..200,
    )
    .prop_map(|parts| parts.concat())
}

proptest! {
    #[test]
    fn prop_dictionary_roundtrip_fragments(text in fragment_string()) {
        let (out, dict) = layer2_dictionary::compress(&text);
        prop_assert_eq!(layer2_dictionary::decompress(&out, &dict).unwrap(), text);
    }

    #[test]
    fn prop_dictionary_roundtrip_any(text in any::<String>()) {
        let (out, dict) = layer2_dictionary::compress(&text);
        prop_assert_eq!(layer2_dictionary::decompress(&out, &dict).unwrap(), text);
    }

    #[test]
    fn prop_pipeline_roundtrip(text in fragment_string()) {
        let pipeline = small_threshold(16);
        let result = pipeline.compress_auto(&text).unwrap();
        let back = pipeline.decompress_auto(&result.compressed_data, &result.metadata).unwrap();
        prop_assert_eq!(back, text);
    }

    #[test]
    fn prop_storage_roundtrip(data in prop::collection::vec(any::<u8>(), 0..512)) {
        prop_assert_eq!(from_storable(&to_storable(&data)).unwrap(), data);
    }
}
