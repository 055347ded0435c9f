//! Builders for small synthetic PDF files.
#![allow(dead_code)]

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

/// Initialise logging once per test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// zlib-compress `data`.
pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Writes objects one after another and remembers their offsets.
pub struct PdfBuilder {
    out: Vec<u8>,
    offsets: Vec<(u32, usize)>,
}

impl PdfBuilder {
    pub fn new(version: &str) -> Self {
        Self {
            out: format!("%PDF-{}\n", version).into_bytes(),
            offsets: Vec::new(),
        }
    }

    /// Current end of the file.
    pub fn pos(&self) -> usize {
        self.out.len()
    }

    /// `id 0 obj <body> endobj`
    pub fn object(&mut self, id: u32, body: &str) -> usize {
        self.object_bytes(id, body.as_bytes())
    }

    pub fn object_bytes(&mut self, id: u32, body: &[u8]) -> usize {
        let at = self.out.len();
        self.offsets.push((id, at));
        self.out.extend_from_slice(format!("{} 0 obj\n", id).as_bytes());
        self.out.extend_from_slice(body);
        self.out.extend_from_slice(b"\nendobj\n");
        at
    }

    /// A stream whose `/Length` is correct.
    pub fn stream(&mut self, id: u32, dict_entries: &str, data: &[u8]) -> usize {
        self.stream_with_length(id, dict_entries, data, data.len() as i64)
    }

    /// A stream declaring `length` regardless of the data.
    pub fn stream_with_length(
        &mut self,
        id: u32,
        dict_entries: &str,
        data: &[u8],
        length: i64,
    ) -> usize {
        let mut body = format!("<< {} /Length {} >>\nstream\n", dict_entries, length).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.object_bytes(id, &body)
    }

    /// Raw bytes, e.g. a hand-written trailer.
    pub fn raw(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(bytes);
    }

    /// Offset recorded for object `id`.
    pub fn offset_of(&self, id: u32) -> usize {
        self.offsets
            .iter()
            .rev()
            .find(|(i, _)| *i == id)
            .map(|(_, off)| *off)
            .unwrap()
    }

    /// Append a classic xref table covering every object written, then the
    /// trailer (`/Size` is added) and `startxref`.
    pub fn finish(mut self, trailer_entries: &str) -> Vec<u8> {
        let size = self.offsets.iter().map(|(id, _)| id + 1).max().unwrap_or(1);
        let xref = self.out.len();
        self.out
            .extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", size).as_bytes());
        for id in 1..size {
            let line = match self.offsets.iter().rev().find(|(i, _)| *i == id) {
                Some((_, off)) => format!("{:010} 00000 n \n", off),
                None => "0000000000 00001 f \n".to_string(),
            };
            self.out.extend_from_slice(line.as_bytes());
        }
        self.out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} {} >>\nstartxref\n{}\n%%EOF\n",
                size, trailer_entries, xref
            )
            .as_bytes(),
        );
        self.out
    }

    /// End the file without any xref data.
    pub fn finish_without_xref(mut self, trailer_entries: &str) -> Vec<u8> {
        self.out
            .extend_from_slice(format!("trailer\n<< {} >>\n%%EOF\n", trailer_entries).as_bytes());
        self.out
    }

    /// Take the bytes written so far.
    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }
}

/// Catalog, page tree and `pages` empty pages as objects 1, 2 and 3...
pub fn simple_document(builder: &mut PdfBuilder, pages: u32) {
    builder.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    let kids: Vec<String> = (0..pages).map(|i| format!("{} 0 R", 3 + i)).collect();
    builder.object(
        2,
        &format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids.join(" "), pages),
    );
    for i in 0..pages {
        builder.object(
            3 + i,
            &format!("<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /N {} >>", i),
        );
    }
}
