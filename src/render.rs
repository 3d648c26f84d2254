//! One-page certificate PDFs.
//!
//! The content stream is written by hand (standard Helvetica, WinAnsi bytes)
//! and the document objects are assembled with `lopdf`. Cell content is drawn
//! in a local "card" box whose origin is the bottom-left corner; rotated cells
//! map that box onto the cell with a 90 degree counter-clockwise matrix.

use crate::{
    assets::{AssetStore, INSTITUTE_LOGO, NOTICE_BACKGROUND},
    compose::{Cell, Layer, PageLayout, Rotation},
    qr::{QrRaster, QrTable},
    record::ReportRecord,
    text::{estimate_width, to_winansi, wrap},
};
use anyhow::{Context, Result, anyhow};
use lopdf::{Dictionary, Document, Object, Stream, dictionary};
use std::collections::HashMap;
use tracing::debug;

pub const DOCUMENT_TITLE: &str = "Jewelry Report";

pub const DEFAULT_COMMENT: &str = "Grading & Identification as mounting permits. Description and weights purported by the client. Report number engraved.";
pub const ECOPY_COMMENT_ONE: &str = "Grading & Identification as mounting permits";
pub const ECOPY_COMMENT_TWO: &str = "Summary number engraved.";
pub const IMPORTANT_NOTICE: &str = "This report is subject to IGI\u{2019}s Terms and Condition, which can be found at www.igi.org/reports/terms and condition";
pub const IMPORTANT_NOTICE_BOLD: &str = "The limitations included in our Terms & Condition apply to every person reading or receiving this report.";
pub const EDITION_STAMP: &str = "CC-J-01.21 @IGI.2021";

/// Everything a renderer needs for one page.
pub struct PageInput<'a> {
    /// 1-based.
    pub page: usize,
    pub layout: &'a PageLayout,
    pub records: &'a [ReportRecord],
    pub qr: &'a QrTable,
}

pub trait PageRenderer {
    fn render(&mut self, input: &PageInput<'_>) -> Result<Vec<u8>>;
}

pub struct PdfPageRenderer {
    assets: Box<dyn AssetStore>,
}

impl PdfPageRenderer {
    pub fn new(assets: Box<dyn AssetStore>) -> Self {
        Self { assets }
    }
}

impl PageRenderer for PdfPageRenderer {
    fn render(&mut self, input: &PageInput<'_>) -> Result<Vec<u8>> {
        let layout = input.layout;
        let mut doc = Document::with_version("1.5");
        let mut images = ImageResources::default();
        let mut ops = Ops::default();

        for (cell, content) in layout.occupied() {
            let record = input.records.get(content.record_index).ok_or_else(|| {
                anyhow!(
                    "cell {} points at record {} but page {} has {}",
                    cell.index,
                    content.record_index,
                    input.page,
                    input.records.len()
                )
            })?;
            let qr = if record.has_report_no() {
                input.qr.get(&record.report_no)
            } else {
                None
            };
            let single = content.rotation == Rotation::None;

            ops.push("q");
            ops.rect(cell.x, pdf_bottom(layout, cell), cell.width, cell.height, "W n");
            let (box_w, box_h) = enter_cell(&mut ops, layout, cell, content.rotation);

            for layer in &content.layers {
                let mut card = Card {
                    ops: &mut ops,
                    w: box_w,
                    h: box_h,
                };
                if *layer == Layer::Full {
                    let names = images.register_for(&mut doc, record, qr, self.assets.as_ref(), single);
                    card.assets(record, &names, single);
                }
                card.text_block(record, single);
            }
            ops.push("Q");
        }

        ops.push("0 g");
        let bw = layout.border_width;
        for &x in &layout.vertical_lines {
            ops.rect(x, 0.0, bw, layout.page_height, "f");
        }
        for &y in &layout.horizontal_lines {
            ops.rect(0.0, layout.page_height - y - bw, layout.page_width, bw, "f");
        }

        finish_document(doc, layout, images, ops.0)
            .with_context(|| format!("assembling PDF for page {}", input.page))
    }
}

fn pdf_bottom(layout: &PageLayout, cell: &Cell) -> f64 {
    layout.page_height - cell.y - cell.height
}

/// Set up the card coordinate system for a cell; returns the card box size.
fn enter_cell(ops: &mut Ops, layout: &PageLayout, cell: &Cell, rotation: Rotation) -> (f64, f64) {
    let bottom = pdf_bottom(layout, cell);
    match rotation {
        Rotation::None => {
            ops.push(&format!("1 0 0 1 {} {} cm", num(cell.x), num(bottom)));
            (cell.width, cell.height)
        }
        Rotation::Deg270 => {
            ops.push(&format!("0 1 -1 0 {} {} cm", num(cell.x + cell.width), num(bottom)));
            (cell.height, cell.width)
        }
    }
}

fn finish_document(
    mut doc: Document,
    layout: &PageLayout,
    images: ImageResources,
    content: String,
) -> Result<Vec<u8>> {
    let pages_id = doc.new_object_id();
    let regular = doc.add_object(standard_font("Helvetica"));
    let bold = doc.add_object(standard_font("Helvetica-Bold"));
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => regular, "F2" => bold },
        "XObject" => images.xobjects,
        "ExtGState" => dictionary! {
            "GS1" => dictionary! { "Type" => "ExtGState", "ca" => Object::from(0.7), "CA" => Object::from(0.7) },
        },
    });
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![
            0.into(),
            0.into(),
            Object::from(layout.page_width),
            Object::from(layout.page_height),
        ],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(DOCUMENT_TITLE),
        "Producer" => Object::string_literal(concat!("certgrid ", env!("CARGO_PKG_VERSION"))),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out).with_context(|| "writing PDF bytes")?;
    Ok(out)
}

fn standard_font(base: &str) -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => "WinAnsiEncoding",
    }
}

/// Image XObjects of one document, shared between cells.
#[derive(Default)]
struct ImageResources {
    xobjects: Dictionary,
    names: HashMap<String, Option<String>>,
    count: usize,
}

#[derive(Default)]
struct CardImages {
    qr: Option<String>,
    item: Option<String>,
    company_logo: Option<String>,
    institute_logo: Option<String>,
    notice: Option<String>,
}

impl ImageResources {
    fn register(&mut self, doc: &mut Document, key: String, make: impl FnOnce() -> Option<Stream>) -> Option<String> {
        if let Some(known) = self.names.get(&key) {
            return known.clone();
        }
        let name = make().map(|stream| {
            self.count += 1;
            let name = format!("Im{}", self.count);
            let id = doc.add_object(stream);
            self.xobjects.set(name.as_str(), id);
            name
        });
        self.names.insert(key, name.clone());
        name
    }

    fn register_for(
        &mut self,
        doc: &mut Document,
        record: &ReportRecord,
        qr: Option<&QrRaster>,
        assets: &dyn AssetStore,
        single: bool,
    ) -> CardImages {
        let mut out = CardImages::default();
        if let Some(raster) = qr {
            out.qr = self.register(doc, format!("qr:{}", record.report_no), || Some(gray_stream(raster)));
        }
        if let Some(file) = record.image_filename.as_deref().filter(|f| !f.is_empty()) {
            out.item = self.register(doc, format!("img:{file}"), || assets.image(file).and_then(|b| rgb_stream(&b, file)));
        }
        if single {
            if let Some(file) = record.company_logo.as_deref().filter(|f| !f.is_empty()) {
                out.company_logo =
                    self.register(doc, format!("logo:{file}"), || assets.logo(file).and_then(|b| rgb_stream(&b, file)));
            }
            out.institute_logo = self.register(doc, format!("brand:{INSTITUTE_LOGO}"), || {
                assets.branding(INSTITUTE_LOGO).and_then(|b| rgb_stream(&b, INSTITUTE_LOGO))
            });
        }
        if record.shows_institute_logo() && out.institute_logo.is_none() {
            out.institute_logo = self.register(doc, format!("brand:{INSTITUTE_LOGO}"), || {
                assets.branding(INSTITUTE_LOGO).and_then(|b| rgb_stream(&b, INSTITUTE_LOGO))
            });
        }
        if record.shows_notice_image() {
            out.notice = self.register(doc, format!("brand:{NOTICE_BACKGROUND}"), || {
                assets.branding(NOTICE_BACKGROUND).and_then(|b| rgb_stream(&b, NOTICE_BACKGROUND))
            });
        }
        out
    }
}

fn gray_stream(raster: &QrRaster) -> Stream {
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => raster.width as i64,
            "Height" => raster.height as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        },
        raster.pixels.clone(),
    )
}

fn rgb_stream(bytes: &[u8], name: &str) -> Option<Stream> {
    let img = match image::load_from_memory(bytes) {
        Ok(img) => img.to_rgb8(),
        Err(err) => {
            debug!("skipping undecodable image {name}: {err}");
            return None;
        }
    };
    Some(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => img.width() as i64,
            "Height" => img.height() as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        img.into_raw(),
    ))
}

#[derive(Default)]
struct Ops(String);

impl Ops {
    fn push(&mut self, op: &str) {
        self.0.push_str(op);
        self.0.push('\n');
    }

    fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, paint: &str) {
        self.push(&format!("{} {} {} {} re {paint}", num(x), num(y), num(w), num(h)));
    }
}

fn num(v: f64) -> String {
    let s = format!("{v:.3}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_string() } else { s.to_string() }
}

/// PDF literal string from WinAnsi bytes, non-ASCII as octal escapes.
fn pdf_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('(');
    for &b in bytes {
        match b {
            b'(' | b')' | b'\\' => {
                out.push('\\');
                out.push(b as char);
            }
            0x20..=0x7E => out.push(b as char),
            _ => out.push_str(&format!("\\{b:03o}")),
        }
    }
    out.push(')');
    out
}

#[derive(Clone, Copy)]
enum Font {
    Regular,
    Bold,
}

/// Card-local measurements, in points from the card's top-left.
struct CardStyle {
    header_top: f64,
    header_left: f64,
    header_right: f64,
    title_size: f64,
    jewelry_size: f64,
    fields_top: f64,
    fields_left: f64,
    label_width: f64,
    label_size: f64,
    value_size: f64,
    line_height: f64,
    value_width: f64,
    footer_left: f64,
    footer_bottom: f64,
}

impl CardStyle {
    fn for_card(w: f64, h: f64, single: bool, ecopy: bool) -> Self {
        if single {
            let value_size = if ecopy { 4.8 } else { 5.0 };
            CardStyle {
                header_top: 5.0,
                header_left: if ecopy { 44.0 } else { 38.0 },
                header_right: 11.0,
                title_size: 6.0,
                jewelry_size: if ecopy { 4.5 } else { 6.3 },
                fields_top: if ecopy { 44.5 } else { 42.0 },
                fields_left: if ecopy { 6.1 } else { 8.1 },
                label_width: if ecopy { 57.0 } else { 53.4 },
                label_size: if ecopy { 4.8 } else { 5.5 },
                value_size,
                line_height: value_size * if ecopy { 1.6 } else { 1.8 },
                value_width: w - if ecopy { 88.0 } else { 38.0 },
                footer_left: 11.0,
                footer_bottom: if ecopy { 1.0 } else { 3.0 },
            }
        } else {
            CardStyle {
                header_top: 7.5,
                header_left: 40.0,
                header_right: 19.3,
                title_size: 6.0,
                jewelry_size: 6.3,
                fields_top: 68.8,
                fields_left: 25.3,
                label_width: 53.4,
                label_size: 6.0,
                value_size: 6.0,
                line_height: 6.0 * 1.6,
                value_width: h + 26.3,
                footer_left: 26.5,
                footer_bottom: 30.3,
            }
        }
    }
}

struct Card<'a> {
    ops: &'a mut Ops,
    w: f64,
    h: f64,
}

impl Card<'_> {
    fn text(&mut self, font: Font, size: f64, x: f64, top: f64, s: &str) {
        let bytes = to_winansi(s);
        if bytes.is_empty() {
            return;
        }
        let f = match font {
            Font::Regular => "F1",
            Font::Bold => "F2",
        };
        let baseline = self.h - top - size * 0.8;
        self.ops.push(&format!(
            "BT /{f} {} Tf {} {} Td {} Tj ET",
            num(size),
            num(x),
            num(baseline),
            pdf_literal(&bytes)
        ));
    }

    fn text_right(&mut self, font: Font, size: f64, right: f64, top: f64, s: &str) {
        let x = self.w - right - estimate_width(s, size);
        self.text(font, size, x, top, s);
    }

    fn image(&mut self, name: &str, x: f64, top: f64, w: f64, h: f64) {
        let y = self.h - top - h;
        self.ops.push(&format!(
            "q {} 0 0 {} {} {} cm /{name} Do Q",
            num(w),
            num(h),
            num(x),
            num(y)
        ));
    }

    fn assets(&mut self, record: &ReportRecord, images: &CardImages, single: bool) {
        let ecopy = record.is_ecopy();
        let (w, h) = (self.w, self.h);

        if single {
            self.ops.push("1 0 0 rg");
            if ecopy {
                self.text(Font::Regular, 5.2, w * 0.624, h * 0.249 - 1.0, "ELECTRONIC COPY");
            } else {
                self.text(Font::Regular, 6.0, w * 0.403, -1.0, "E-COPY");
            }
            self.ops.push("0 g");

            if let Some(name) = &images.company_logo {
                let side = if ecopy { 29.0 } else { 31.0 };
                let right = if ecopy { 59.0 } else { 18.0 };
                let top = h * if ecopy { 0.03 } else { 0.08 };
                self.image(name, w - right - side, top, side, side);
            }
            if let Some(name) = &images.institute_logo {
                let side = if ecopy { 50.0 } else { 52.0 };
                let (left, top) = if ecopy { (6.0, -9.0) } else { (1.0, -11.0) };
                self.image(name, left, top, side, side);
            }
        }

        if record.shows_institute_logo() {
            if let Some(name) = &images.institute_logo {
                let top = h * if single { if ecopy { 0.31 } else { 0.30 } } else { 0.335 };
                self.ops.push("q /GS1 gs");
                self.image(name, -54.0, top, w * 0.75, h * 0.62);
                self.ops.push("Q");
            }
        }

        if let Some(name) = &images.notice {
            let (left, width) = if single { (0.0, w) } else { (11.0, w * 0.9) };
            let height = if single { if ecopy { 10.0 } else { 13.0 } } else { 15.0 };
            let bottom = if single { 0.0 } else { h * 0.13 };
            self.image(name, left, h - bottom - height, width, height);
        }

        if let Some(name) = &images.item {
            let (top, right, iw, ih) = if single {
                (h * if ecopy { 0.45 } else { 0.41 }, if ecopy { 6.0 } else { 8.5 }, 43.0, 43.0)
            } else {
                (h * 0.46, 24.0, 46.0, 45.0)
            };
            self.image(name, w - right - iw, top, iw, ih);
        }

        if let Some(name) = &images.qr {
            self.image(name, w * 0.41, h * 0.13, 33.0, 34.0);
        }
    }

    /// Header, field rows, notice and edition stamp; painted by both layers.
    fn text_block(&mut self, record: &ReportRecord, single: bool) {
        let ecopy = single && record.is_ecopy();
        let st = CardStyle::for_card(self.w, self.h, single, ecopy);

        let top = st.header_top;
        self.text(Font::Bold, st.title_size, st.header_left, top, "INTERNATIONAL");
        self.text(Font::Bold, st.title_size, st.header_left, top + st.title_size + 1.0, "GEMOLOGICAL");
        self.text(
            Font::Bold,
            st.title_size,
            st.header_left,
            top + 2.0 * (st.title_size + 1.1),
            "INSTITUTE INDIA",
        );
        self.text_right(Font::Regular, st.jewelry_size, st.header_right, top, "JEWELRY REPORT");

        let report_label = if ecopy { "SUMMARY NO" } else { "Report No" };
        let weight = if record.tot_est_weight.is_empty() {
            String::new()
        } else {
            format!("{} Carat", record.tot_est_weight)
        };
        let style_line = format!("Style #{}", record.style_number);
        let comments = if ecopy {
            let one = record.comment.as_deref().unwrap_or(ECOPY_COMMENT_ONE);
            let two = record.comment.as_deref().unwrap_or(ECOPY_COMMENT_TWO);
            vec![one.to_string(), two.to_string(), style_line]
        } else {
            let comment = record.comment.as_deref().unwrap_or(DEFAULT_COMMENT);
            vec![format!("{comment} {style_line}")]
        };

        let rows: [(&str, Vec<String>); 7] = [
            (report_label, vec![record.report_no.clone()]),
            ("Description", vec![record.description.clone()]),
            ("Shape and Cut", vec![record.shape_and_cut.clone()]),
            ("Tot. Est.Weight", vec![weight]),
            ("Color", vec![record.color.clone()]),
            ("Clarity", vec![record.clarity.clone()]),
            ("Comments", comments),
        ];

        let mut y = st.fields_top;
        for (label, values) in rows {
            self.text(Font::Regular, st.label_size, st.fields_left, y, label);
            let indent = st.fields_left + st.label_width;
            self.text(Font::Bold, st.value_size, indent - 4.0, y, ":");
            let mut first = true;
            for value in &values {
                let lines = if first {
                    wrap(value, st.value_size, st.value_width - st.label_width, st.value_width)
                } else {
                    wrap(value, st.value_size, st.value_width - st.label_width, st.value_width - st.label_width)
                };
                for (i, line) in lines.iter().enumerate() {
                    let x = if first && i > 0 { st.fields_left } else { indent };
                    self.text(Font::Bold, st.value_size, x, y, line);
                    y += st.line_height;
                }
                if lines.is_empty() {
                    y += st.line_height;
                }
                first = false;
            }
        }

        let footer_size = 2.9;
        let footer_width = self.w - 2.0 * st.footer_left;
        let mut notice = wrap(
            &format!("Important notice: {IMPORTANT_NOTICE}"),
            footer_size,
            footer_width,
            footer_width,
        );
        notice.extend(wrap(IMPORTANT_NOTICE_BOLD, footer_size, footer_width, footer_width));
        let footer_top = self.h - st.footer_bottom - notice.len() as f64 * (footer_size + 1.0);
        for (i, line) in notice.iter().enumerate() {
            self.text(
                Font::Regular,
                footer_size,
                st.footer_left,
                footer_top + i as f64 * (footer_size + 1.0),
                line,
            );
        }

        let (bottom_frac, right_frac) = if single { (0.027, 0.05) } else { (0.16, 0.116) };
        let stamp_size = 3.0;
        self.text_right(
            Font::Regular,
            stamp_size,
            self.w * right_frac,
            self.h - self.h * bottom_frac - stamp_size,
            EDITION_STAMP,
        );
    }
}
