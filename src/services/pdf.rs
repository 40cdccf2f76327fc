//! Single-page PDF ticket with the credential image embedded.
//!
//! Text uses the built-in Helvetica font, so only printable ASCII is
//! rendered and anything else becomes `?`.

use image::GrayImage;
use std::fmt::Write as _;

const PAGE_WIDTH: u32 = 595;
const PAGE_HEIGHT: u32 = 842;
const IMAGE_EDGE_PT: u32 = 260;
const LEFT_MARGIN: u32 = 56;

/// Everything printed on one ticket.
#[derive(Debug, Clone)]
pub struct TicketSheet<'a> {
    pub title: &'a str,
    pub lines: Vec<(String, String)>,
    pub qr: &'a GrayImage,
}

pub fn render_ticket(sheet: &TicketSheet<'_>) -> Vec<u8> {
    let content = page_content(sheet);
    let qr = sheet.qr;

    let objects: Vec<Vec<u8>> = vec![
        b"<< /Type /Catalog /Pages 2 0 R >>".to_vec(),
        b"<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_vec(),
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
             /Resources << /Font << /F1 5 0 R >> /XObject << /Im1 6 0 R >> >> /Contents 4 0 R >>"
        )
        .into_bytes(),
        stream_object("", content.as_bytes()),
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_vec(),
        stream_object(
            &format!(
                "/Type /XObject /Subtype /Image /Width {} /Height {} \
                 /ColorSpace /DeviceGray /BitsPerComponent 8",
                qr.width(),
                qr.height()
            ),
            qr.as_raw(),
        ),
    ];

    let mut pdf = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n", index + 1).as_bytes());
        pdf.extend_from_slice(body);
        pdf.extend_from_slice(b"\nendobj\n");
    }

    let xref_at = pdf.len();
    let mut trailer = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = write!(trailer, "{offset:010} 00000 n \n");
    }
    let _ = write!(
        trailer,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
        objects.len() + 1
    );
    pdf.extend_from_slice(trailer.as_bytes());
    pdf
}

fn stream_object(dictionary: &str, data: &[u8]) -> Vec<u8> {
    let mut object = format!("<< {dictionary} /Length {} >>\nstream\n", data.len()).into_bytes();
    object.extend_from_slice(data);
    object.extend_from_slice(b"\nendstream");
    object
}

fn page_content(sheet: &TicketSheet<'_>) -> String {
    let mut content = String::new();
    let top = PAGE_HEIGHT - 80;

    let _ = write!(
        content,
        "BT /F1 20 Tf {LEFT_MARGIN} {top} Td ({}) Tj ET\n",
        escape(sheet.title)
    );

    let _ = write!(content, "BT /F1 11 Tf 16 TL {LEFT_MARGIN} {} Td\n", top - 36);
    for (label, value) in &sheet.lines {
        let _ = write!(content, "({}: {}) Tj T*\n", escape(label), escape(value));
    }
    content.push_str("ET\n");

    let x = (PAGE_WIDTH - IMAGE_EDGE_PT) / 2;
    let y = 120;
    let _ = write!(
        content,
        "q {IMAGE_EDGE_PT} 0 0 {IMAGE_EDGE_PT} {x} {y} cm /Im1 Do Q\n"
    );
    content
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            ' '..='~' => escaped.push(c),
            _ => escaped.push('?'),
        }
    }
    escaped
}
