#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

pub const CHAPTER_ONE: &str = "<h1>One</h1>\
<p>The arcane ritual began with an esoteric chant.</p>\
<p>Read the <a href=\"notes.xhtml\">arcane notes</a> later.</p>";

pub const CHAPTER_TWO: &str = "<h1>Two</h1>\
<p>A conundrum: why buy a widget at all?</p>";

/// A two-chapter EPUB 2 package, built in memory.
pub fn sample_epub() -> Vec<u8> {
    build_epub("Sample Book", &[("ch1", CHAPTER_ONE), ("ch2", CHAPTER_TWO)])
}

pub fn build_epub(title: &str, chapters: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    zip.start_file("mimetype", stored).unwrap();
    zip.write_all(b"application/epub+zip").unwrap();

    zip.start_file("META-INF/container.xml", stored).unwrap();
    zip.write_all(CONTAINER_XML.as_bytes()).unwrap();

    let mut manifest = String::from(
        "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n",
    );
    let mut spine = String::new();
    let mut nav_points = String::new();
    for (order, (id, _)) in chapters.iter().enumerate() {
        manifest.push_str(&format!(
            "    <item id=\"{id}\" href=\"{id}.xhtml\" media-type=\"application/xhtml+xml\"/>\n"
        ));
        spine.push_str(&format!("    <itemref idref=\"{id}\"/>\n"));
        nav_points.push_str(&format!(
            "    <navPoint id=\"nav-{id}\" playOrder=\"{}\"><navLabel><text>{id}</text></navLabel><content src=\"{id}.xhtml\"/></navPoint>\n",
            order + 1
        ));
    }

    let opf = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="BookId">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:title>{title}</dc:title>
    <dc:identifier id="BookId">urn:uuid:lexicon-reader-sample</dc:identifier>
    <dc:language>en</dc:language>
    <dc:creator>Test Author</dc:creator>
  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine toc="ncx">
{spine}  </spine>
</package>
"#
    );
    zip.start_file("OEBPS/content.opf", stored).unwrap();
    zip.write_all(opf.as_bytes()).unwrap();

    let ncx = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head><meta name="dtb:uid" content="urn:uuid:lexicon-reader-sample"/></head>
  <docTitle><text>{title}</text></docTitle>
  <navMap>
{nav_points}  </navMap>
</ncx>
"#
    );
    zip.start_file("OEBPS/toc.ncx", stored).unwrap();
    zip.write_all(ncx.as_bytes()).unwrap();

    for (id, body) in chapters {
        let xhtml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>{id}</title></head><body>{body}</body></html>"
        );
        zip.start_file(format!("OEBPS/{id}.xhtml"), stored).unwrap();
        zip.write_all(xhtml.as_bytes()).unwrap();
    }

    zip.finish().unwrap().into_inner()
}

pub fn write_sample_epub(dir: &Path) -> PathBuf {
    let path = dir.join("sample.epub");
    std::fs::write(&path, sample_epub()).unwrap();
    path
}
