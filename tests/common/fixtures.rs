use epub_pager::MemoryResourceReader;

pub const OPF_PATH: &str = "OEBPS/content.opf";
pub const FIGURE_PATH: &str = "OEBPS/images/fig.png";
pub const FIGURE_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a];

/// Archive path of chapter `index` (1-based).
pub fn chapter_path(index: usize) -> String {
    format!("OEBPS/text/ch{}.xhtml", index)
}

/// Body markup of chapter `index`: a heading, `paragraphs` paragraphs of
/// numbered words, a figure and a link to the next chapter.
pub fn chapter_body(index: usize, chapters: usize, paragraphs: usize) -> String {
    let mut body = format!("<h1 id=\"ch{}\">Chapter {}</h1>\n", index, index);
    for paragraph in 0..paragraphs {
        let words: Vec<String> = (0..24)
            .map(|word| format!("c{}p{}w{}", index, paragraph, word))
            .collect();
        body.push_str(&format!(
            "<p id=\"c{}p{}\">{}</p>\n",
            index,
            paragraph,
            words.join(" ")
        ));
        if paragraph == 0 {
            body.push_str("<p><img src=\"../images/fig.png\" alt=\"figure\"/></p>\n");
        }
    }
    if index < chapters {
        body.push_str(&format!(
            "<p><a href=\"ch{}.xhtml#ch{}\">Next</a></p>\n",
            index + 1,
            index + 1
        ));
    }
    body
}

pub fn chapter_xhtml(index: usize, chapters: usize, paragraphs: usize) -> String {
    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n",
            "<html xmlns=\"http://www.w3.org/1999/xhtml\">\n",
            "<head><title>Chapter {}</title></head>\n",
            "<body class=\"chapter\">{}</body>\n",
            "</html>\n"
        ),
        index,
        chapter_body(index, chapters, paragraphs)
    )
}

pub fn package_xml(chapters: usize) -> String {
    let mut manifest = String::new();
    let mut spine = String::new();
    for index in 1..=chapters {
        manifest.push_str(&format!(
            "<item id=\"ch{}\" href=\"text/ch{}.xhtml\" media-type=\"application/xhtml+xml\"/>\n",
            index, index
        ));
        spine.push_str(&format!("<itemref idref=\"ch{}\"/>\n", index));
    }
    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n",
            "<package xmlns=\"http://www.idpf.org/2007/opf\" version=\"3.0\">\n",
            "<metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n",
            "<dc:title>Synthetic Book</dc:title>\n",
            "<meta name=\"cover\" content=\"fig\"/>\n",
            "</metadata>\n",
            "<manifest>\n{}",
            "<item id=\"fig\" href=\"images/fig.png\" media-type=\"image/png\"/>\n",
            "</manifest>\n",
            "<spine>\n{}</spine>\n",
            "</package>\n"
        ),
        manifest, spine
    )
}

/// In-memory archive with `chapters` chapters of `paragraphs` paragraphs.
pub fn synthetic_book(chapters: usize, paragraphs: usize) -> MemoryResourceReader {
    let mut reader = MemoryResourceReader::new();
    reader.insert(
        "META-INF/container.xml",
        "<container><rootfiles><rootfile full-path=\"OEBPS/content.opf\"/></rootfiles></container>",
    );
    reader.insert(OPF_PATH, package_xml(chapters));
    for index in 1..=chapters {
        reader.insert(chapter_path(index), chapter_xhtml(index, chapters, paragraphs));
    }
    reader.insert(FIGURE_PATH, FIGURE_BYTES.to_vec());
    reader
}
