//! Decoding must not depend on how the body was chunked.

use proptest::prelude::*;
use pullstream::progress::{Record, StreamDecoder};

const BODY: &str = concat!(
    "data: {\"status\":\"pulling manifest\"}\n",
    "\n",
    "data: {\"status\":\"downloading\",\"completed_mb\":12.5,\"total_mb\":100,\"progress\":12.5}\r\n",
    "event: ignored\n",
    "data: {broken\n",
    "data: {\"status\":\"verifying\",\"note\":\"\u{00e9}t\u{00e9} \u{1f680}\"}\n",
    "data: {\"status\":\"success\"}"
);

fn decode_whole() -> Vec<Record> {
    let mut decoder = StreamDecoder::new();
    let mut records = decoder.feed(BODY.as_bytes());
    records.extend(decoder.finish());
    records
}

fn decode_split(cuts: &[usize]) -> Vec<Record> {
    let bytes = BODY.as_bytes();
    let mut cuts: Vec<usize> = cuts.iter().map(|c| c % (bytes.len() + 1)).collect();
    cuts.sort_unstable();
    let mut decoder = StreamDecoder::new();
    let mut records = Vec::new();
    let mut start = 0;
    for cut in cuts {
        records.extend(decoder.feed(&bytes[start..cut]));
        start = cut;
    }
    records.extend(decoder.feed(&bytes[start..]));
    records.extend(decoder.finish());
    records
}

#[test]
fn whole_body_yields_five_records() {
    let records = decode_whole();
    assert_eq!(records.len(), 5);
    assert!(matches!(records[2], Record::Malformed(_)));
    match &records[3] {
        Record::Data(value) => assert_eq!(value["note"], "\u{00e9}t\u{00e9} \u{1f680}"),
        other => panic!("unexpected record: {other:?}"),
    }
}

proptest! {
    #[test]
    fn any_chunking_matches_whole_body(cuts in proptest::collection::vec(0usize..4096, 0..12)) {
        prop_assert_eq!(decode_split(&cuts), decode_whole());
    }
}
