use anyhow::{Result, anyhow};
use certgrid::{
    qr::{QrCache, QrCodeEncoder, QrEncoder, QrRaster, verify_url},
    record::ReportRecord,
};
use std::sync::Mutex;

/// Records every text it is asked to encode.
#[derive(Default)]
struct CountingEncoder {
    calls: Mutex<Vec<String>>,
    fail_on: Option<&'static str>,
}

impl CountingEncoder {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl QrEncoder for CountingEncoder {
    fn encode(&self, text: &str) -> Result<QrRaster> {
        self.calls.lock().unwrap().push(text.to_string());
        if self.fail_on.is_some_and(|f| text.ends_with(f)) {
            return Err(anyhow!("refusing {text}"));
        }
        Ok(QrRaster {
            width: 1,
            height: 1,
            pixels: vec![0],
        })
    }
}

fn record(no: &str) -> ReportRecord {
    ReportRecord {
        report_no: no.to_string(),
        ..Default::default()
    }
}

#[test]
fn verify_url_encodes_report_number() {
    assert_eq!(verify_url("https://v.example/", "LG 123/4"), "https://v.example/?r=LG%20123%2F4");
    assert_eq!(verify_url("http://localhost:3000", "A1"), "http://localhost:3000/?r=A1");
}

#[test]
fn each_report_number_is_encoded_once() {
    let enc = CountingEncoder::default();
    let mut cache = QrCache::new();
    for _ in 0..3 {
        assert!(cache.get_or_create("A1", "http://h", &enc).is_some());
    }
    let page = vec![record("A1"), record("B2"), record("B2"), record("C3")];
    let table = cache.resolve_page(&page, "http://h", &enc);
    assert_eq!(table.len(), 3);
    let again = cache.resolve_page(&page, "http://h", &enc);
    assert_eq!(again.len(), 3);

    let mut calls = enc.calls();
    calls.sort();
    assert_eq!(calls, vec!["http://h/?r=A1", "http://h/?r=B2", "http://h/?r=C3"]);
    assert_eq!(cache.len(), 3);
}

#[test]
fn failures_are_cached_as_absent() {
    let enc = CountingEncoder {
        fail_on: Some("BAD"),
        ..Default::default()
    };
    let mut cache = QrCache::new();
    let table = cache.resolve_page(&[record("BAD"), record("OK")], "http://h", &enc);
    assert!(table.contains("BAD"));
    assert!(table.get("BAD").is_none());
    assert!(table.get("OK").is_some());
    assert!(cache.get_or_create("BAD", "http://h", &enc).is_none());
    assert_eq!(enc.calls().len(), 2);
}

#[test]
fn blank_report_numbers_are_skipped() {
    let enc = CountingEncoder::default();
    let mut cache = QrCache::new();
    assert!(cache.get_or_create("", "http://h", &enc).is_none());
    assert!(cache.get_or_create("   ", "http://h", &enc).is_none());
    let table = cache.resolve_page(&[record(""), record("X")], "http://h", &enc);
    assert_eq!(table.len(), 1);
    assert_eq!(enc.calls(), vec!["http://h/?r=X"]);
    assert!(cache.get_or_create("", "http://h", &enc).is_none());
    assert_eq!(cache.len(), 1);
}

#[test]
fn precomputed_data_url_wins() {
    let raster = QrCodeEncoder::default().encode("http://h/?r=P").unwrap();
    let mut rec = record("P");
    rec.qr_data_url = Some(raster.to_data_url().unwrap());
    let enc = CountingEncoder::default();
    let mut cache = QrCache::new();
    let table = cache.resolve_page(&[rec], "http://h", &enc);
    assert_eq!(table.get("P"), Some(&raster));
    assert!(enc.calls().is_empty());
}

#[test]
fn real_encoder_makes_square_print_raster() {
    let raster = QrCodeEncoder::default().encode(&verify_url("http://localhost:3000", "LG600123456")).unwrap();
    assert_eq!(raster.width, raster.height);
    assert!(raster.width >= 1000);
    assert_eq!(raster.pixels.len(), (raster.width * raster.height) as usize);
    // quiet zone corner is light, finder pattern corner is dark
    assert_eq!(raster.pixels[0], 255);
    assert!(raster.pixels.contains(&0));
    let png = raster.to_png().unwrap();
    assert_eq!(&png[1..4], b"PNG");
}
