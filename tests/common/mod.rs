//! Synthesized EPUB fixtures.
//!
//! Books are built in memory with `zip::ZipWriter` so every test states
//! exactly which container quirks it exercises.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

pub const XHTML: &str = "application/xhtml+xml";
pub const NCX: &str = "application/x-dtbncx+xml";
pub const PNG: &str = "image/png";
pub const JPEG: &str = "image/jpeg";

/// Fake image bytes; nothing decodes them.
pub fn image_bytes(tag: &str) -> Vec<u8> {
    let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
    data.extend_from_slice(tag.as_bytes());
    data
}

/// A minimal XHTML content document around `body`.
pub fn xhtml(title: &str, body: &str) -> Vec<u8> {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>{title}</title></head>
<body>{body}</body>
</html>"#
    )
    .into_bytes()
}

/// An NCX document whose `<navMap>` holds `nav_points`.
pub fn ncx(nav_points: &str) -> Vec<u8> {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head><meta name="dtb:uid" content="urn:test"/></head>
  <docTitle><text>Test</text></docTitle>
  <navMap>
{nav_points}
  </navMap>
</ncx>"#
    )
    .into_bytes()
}

/// A `<navPoint>` with optional nested points.
pub fn nav_point(id: &str, title: &str, src: &str, children: &str) -> String {
    format!(
        r#"<navPoint id="{id}"><navLabel><text>{title}</text></navLabel><content src="{src}"/>{children}</navPoint>"#
    )
}

/// An EPUB 3 navigation document with `ol` as the toc list.
pub fn nav_document(ol: &str) -> Vec<u8> {
    xhtml(
        "Contents",
        &format!(r#"<nav epub:type="toc" id="toc"><h1>Contents</h1>{ol}</nav>"#),
    )
}

#[derive(Debug, Clone)]
struct Item {
    id: String,
    href: String,
    media_type: String,
    properties: Option<String>,
    data: Option<Vec<u8>>,
}

/// Builds an EPUB archive.
#[derive(Debug, Clone)]
pub struct EpubBuilder {
    opf_dir: String,
    metadata: Vec<(String, String)>,
    cover_meta: Option<String>,
    items: Vec<Item>,
    spine: Vec<(String, bool)>,
    toc_id: Option<String>,
    extra_files: Vec<(String, Vec<u8>)>,
}

impl Default for EpubBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EpubBuilder {
    pub fn new() -> Self {
        Self {
            opf_dir: "OEBPS".to_string(),
            metadata: Vec::new(),
            cover_meta: None,
            items: Vec::new(),
            spine: Vec::new(),
            toc_id: None,
            extra_files: Vec::new(),
        }
    }

    /// Directory of the package document inside the archive ("" for the root).
    pub fn opf_dir(mut self, dir: &str) -> Self {
        self.opf_dir = dir.to_string();
        self
    }

    /// A Dublin Core element, e.g. `dc("title", "Moby Dick")`.
    pub fn dc(mut self, name: &str, value: &str) -> Self {
        self.metadata.push((name.to_string(), value.to_string()));
        self
    }

    /// EPUB 2 `<meta name="cover" content="..."/>`.
    pub fn cover_meta(mut self, id: &str) -> Self {
        self.cover_meta = Some(id.to_string());
        self
    }

    /// A manifest item stored in the archive. `href` is written to the OPF
    /// verbatim and stored at its percent-decoded path.
    pub fn item(mut self, id: &str, href: &str, media_type: &str, data: Vec<u8>) -> Self {
        self.items.push(Item {
            id: id.to_string(),
            href: href.to_string(),
            media_type: media_type.to_string(),
            properties: None,
            data: Some(data),
        });
        self
    }

    /// A manifest item with `properties`.
    pub fn item_with_properties(
        mut self,
        id: &str,
        href: &str,
        media_type: &str,
        properties: &str,
        data: Vec<u8>,
    ) -> Self {
        self.items.push(Item {
            id: id.to_string(),
            href: href.to_string(),
            media_type: media_type.to_string(),
            properties: Some(properties.to_string()),
            data: Some(data),
        });
        self
    }

    /// A manifest item whose file is absent from the archive.
    pub fn missing_item(mut self, id: &str, href: &str, media_type: &str) -> Self {
        self.items.push(Item {
            id: id.to_string(),
            href: href.to_string(),
            media_type: media_type.to_string(),
            properties: None,
            data: None,
        });
        self
    }

    /// A document added to both the manifest and the spine.
    pub fn chapter(self, id: &str, href: &str, body: &str) -> Self {
        self.item(id, href, XHTML, xhtml(id, body)).spine(id)
    }

    pub fn spine(mut self, idref: &str) -> Self {
        self.spine.push((idref.to_string(), true));
        self
    }

    pub fn non_linear_spine(mut self, idref: &str) -> Self {
        self.spine.push((idref.to_string(), false));
        self
    }

    /// An NCX referenced from `spine@toc`.
    pub fn ncx(mut self, href: &str, nav_points: &str) -> Self {
        self = self.item("ncx", href, NCX, ncx(nav_points));
        self.toc_id = Some("ncx".to_string());
        self
    }

    /// An EPUB 3 navigation document.
    pub fn nav(self, href: &str, ol: &str) -> Self {
        self.item_with_properties("nav", href, XHTML, "nav", nav_document(ol))
    }

    /// A raw file at an archive path, outside the manifest.
    pub fn file(mut self, path: &str, data: Vec<u8>) -> Self {
        self.extra_files.push((path.to_string(), data));
        self
    }

    pub fn package_document(&self) -> String {
        let mut opf = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="BookId">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
"#,
        );
        for (name, value) in &self.metadata {
            opf.push_str(&format!("    <dc:{name}>{}</dc:{name}>\n", escape_xml(value)));
        }
        if let Some(ref id) = self.cover_meta {
            opf.push_str(&format!("    <meta name=\"cover\" content=\"{id}\"/>\n"));
        }
        opf.push_str("  </metadata>\n  <manifest>\n");

        for item in &self.items {
            let properties = item
                .properties
                .as_ref()
                .map(|p| format!(" properties=\"{p}\""))
                .unwrap_or_default();
            opf.push_str(&format!(
                "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"{properties}/>\n",
                item.id,
                escape_xml(&item.href),
                item.media_type
            ));
        }

        match self.toc_id {
            Some(ref id) => opf.push_str(&format!("  </manifest>\n  <spine toc=\"{id}\">\n")),
            None => opf.push_str("  </manifest>\n  <spine>\n"),
        }
        for (idref, linear) in &self.spine {
            let linear = if *linear { "" } else { " linear=\"no\"" };
            opf.push_str(&format!("    <itemref idref=\"{idref}\"{linear}/>\n"));
        }
        opf.push_str("  </spine>\n</package>\n");
        opf
    }

    fn archive_path(&self, href: &str) -> String {
        let decoded = percent_decode_str(href).decode_utf8_lossy().into_owned();
        if self.opf_dir.is_empty() {
            decoded
        } else {
            format!("{}/{decoded}", self.opf_dir)
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        let deflated =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        zip.start_file("mimetype", stored).unwrap();
        zip.write_all(b"application/epub+zip").unwrap();

        let opf_path = self.archive_path("content.opf");
        zip.start_file("META-INF/container.xml", deflated).unwrap();
        zip.write_all(
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="{opf_path}" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#
            )
            .as_bytes(),
        )
        .unwrap();

        zip.start_file(opf_path.as_str(), deflated).unwrap();
        zip.write_all(self.package_document().as_bytes()).unwrap();

        for item in &self.items {
            if let Some(ref data) = item.data {
                zip.start_file(self.archive_path(&item.href).as_str(), deflated)
                    .unwrap();
                zip.write_all(data).unwrap();
            }
        }

        for (path, data) in &self.extra_files {
            zip.start_file(path.as_str(), deflated).unwrap();
            zip.write_all(data).unwrap();
        }

        zip.finish().unwrap().into_inner()
    }

    /// Write the archive to `dir/name` and return its path.
    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// A small, well-formed book: NCX navigation, two chapters, a declared cover
/// and an inline figure.
pub fn sample_book() -> EpubBuilder {
    EpubBuilder::new()
        .dc("title", "Sample Book")
        .dc("creator", "Ada Writer")
        .dc("creator", "Bo Editor")
        .dc("language", "en-GB")
        .dc("identifier", "urn:isbn:9780000000000")
        .dc("publisher", "Test House")
        .dc("date", "2021-03-04")
        .dc("subject", "Testing")
        .cover_meta("cover-img")
        .item("cover-img", "images/front.jpg", JPEG, image_bytes("front"))
        .item("fig", "images/figure%201.png", PNG, image_bytes("figure"))
        .chapter(
            "ch1",
            "text/ch1.xhtml",
            r#"<h1 id="start">Chapter One</h1><p>It was a dark night.</p>
<p><img src="../images/figure%201.png" alt="Figure"/></p>"#,
        )
        .chapter(
            "ch2",
            "text/ch2.xhtml",
            r#"<h1>Chapter Two</h1><p>Morning came.</p><p id="later">Later.</p>"#,
        )
        .ncx(
            "toc.ncx",
            &[
                nav_point(
                    "n1",
                    "Chapter One",
                    "text/ch1.xhtml#start",
                    &nav_point("n1a", "Figure", "text/ch1.xhtml#fig", ""),
                ),
                nav_point("n2", "Chapter Two", "text/ch2.xhtml", ""),
            ]
            .concat(),
        )
}
