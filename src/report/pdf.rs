use std::fmt::Write;

const PAGE_WIDTH: u32 = 612;
const PAGE_HEIGHT: u32 = 792;
const MARGIN: u32 = 50;
const FONT_SIZE: u32 = 10;
const LEADING: u32 = 14;
const MAX_LINE_CHARS: usize = 100;

pub const MAX_LINES: usize = ((PAGE_HEIGHT - 2 * MARGIN) / LEADING) as usize;

/// Escapes a line for a PDF string literal; non-ASCII becomes `?`.
fn escape(line: &str) -> String {
    let mut escaped = String::with_capacity(line.len());
    for ch in line.chars().take(MAX_LINE_CHARS) {
        match ch {
            '\\' | '(' | ')' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            ' '..='~' => escaped.push(ch),
            '\t' => escaped.push(' '),
            _ => escaped.push('?'),
        }
    }
    escaped
}

fn content_stream(text: &str) -> String {
    let mut lines: Vec<&str> = text.lines().collect();
    let truncated = lines.len() > MAX_LINES;
    if truncated {
        lines.truncate(MAX_LINES - 1);
    }

    let mut stream = String::new();
    let _ = writeln!(stream, "BT");
    let _ = writeln!(stream, "/F1 {FONT_SIZE} Tf");
    let _ = writeln!(stream, "{LEADING} TL");
    let _ = writeln!(stream, "{MARGIN} {} Td", PAGE_HEIGHT - MARGIN);
    for line in lines {
        let _ = writeln!(stream, "({}) Tj T*", escape(line));
    }
    if truncated {
        let _ = writeln!(stream, "(... truncated, see the markdown report) Tj T*");
    }
    let _ = write!(stream, "ET");
    stream
}

pub fn render_pdf(text: &str) -> Vec<u8> {
    let stream = content_stream(text);
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
             /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>"
        ),
        format!("<< /Length {} >>\nstream\n{stream}\nendstream", stream.len()),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        let _ = write!(pdf, "{} 0 obj\n{body}\nendobj\n", index + 1);
    }

    let xref_offset = pdf.len();
    let _ = write!(pdf, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = write!(pdf, "{offset:010} 00000 n \n");
    }
    let _ = write!(
        pdf,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
        objects.len() + 1
    );

    pdf.into_bytes()
}
