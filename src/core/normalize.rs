//! Canonical form of XML fragments for substring comparison.
//!
//! Two fragments that differ only in formatting (indentation, attribute
//! spacing, quote style, comments, `<a></a>` against `<a/>`) or letter case
//! normalize to the same string, so a device descriptor written by hand can
//! be found inside the XML libvirt reports for a domain.
//!
//! Text nodes are trimmed, so whitespace between text and an adjacent tag is
//! not kept: `Hello <b/> World` becomes `hello<b/>world`.

use crate::utils::error::{JugglerError, Result};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Minifies and lowercases `xml`.
///
/// The output is itself valid input and normalizing it again returns it
/// unchanged.
pub fn normalize(xml: &str) -> Result<String> {
    // Case is folded per token, after parsing, so markup keywords like
    // `<![CDATA[` keep the spelling the parser expects.
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    reader.config_mut().check_end_names = false;

    let mut writer = CanonicalWriter::default();
    loop {
        let event = reader.read_event().map_err(|e| malformed(&reader, e))?;
        match event {
            Event::Start(start) => {
                let (name, attributes) = tag_parts(&start)?;
                writer.open(&name, &attributes);
            }
            Event::Empty(start) => {
                let (name, attributes) = tag_parts(&start)?;
                writer.empty(&name, &attributes);
            }
            Event::End(end) => {
                let end_name = end.name();
                let name = utf8(end_name.as_ref())?.to_lowercase();
                writer.close(&name)?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| malformed(&reader, e))?;
                writer.text(&text.to_lowercase());
            }
            Event::CData(cdata) => {
                let raw = cdata.into_inner();
                writer.text(&utf8(&raw)?.to_lowercase());
            }
            Event::Eof => break,
            // declarations, comments, processing instructions, doctype
            _ => {}
        }
    }

    writer.finish()
}

/// Tag name plus attributes in document order, values unescaped.
fn tag_parts(start: &BytesStart<'_>) -> Result<(String, Vec<(String, String)>)> {
    let start_name = start.name();
    let name = utf8(start_name.as_ref())?.to_lowercase();
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| JugglerError::Normalization {
            message: format!("bad attribute in <{}>: {}", name, e),
        })?;
        let key = utf8(attribute.key.as_ref())?.to_lowercase();
        let value = attribute
            .unescape_value()
            .map_err(|e| JugglerError::Normalization {
                message: format!("bad value for attribute {} in <{}>: {}", key, name, e),
            })?;
        attributes.push((key, value.to_lowercase()));
    }
    Ok((name, attributes))
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| JugglerError::Normalization {
        message: format!("invalid utf-8: {}", e),
    })
}

fn malformed(reader: &Reader<&[u8]>, error: impl std::fmt::Display) -> JugglerError {
    JugglerError::Normalization {
        message: format!("at byte {}: {}", reader.buffer_position(), error),
    }
}

#[derive(Default)]
struct CanonicalWriter {
    out: String,
    open: Vec<String>,
    // A start tag whose `>` has not been written yet, so it can still turn
    // into `/>` if the element ends up empty.
    start_pending: bool,
}

impl CanonicalWriter {
    fn open(&mut self, name: &str, attributes: &[(String, String)]) {
        self.write_tag_head(name, attributes);
        self.start_pending = true;
        self.open.push(name.to_string());
    }

    fn empty(&mut self, name: &str, attributes: &[(String, String)]) {
        self.write_tag_head(name, attributes);
        self.out.push_str("/>");
    }

    fn close(&mut self, name: &str) -> Result<()> {
        match self.open.pop() {
            Some(open) if open == name => {}
            Some(open) => {
                return Err(JugglerError::Normalization {
                    message: format!("expected </{}>, found </{}>", open, name),
                })
            }
            None => {
                return Err(JugglerError::Normalization {
                    message: format!("unexpected </{}>", name),
                })
            }
        }

        if self.start_pending {
            self.start_pending = false;
            self.out.push_str("/>");
        } else {
            self.out.push_str("</");
            self.out.push_str(name);
            self.out.push('>');
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            return;
        }
        self.flush_start();
        self.out.push_str(&escape(collapsed.as_str()));
    }

    fn finish(self) -> Result<String> {
        if let Some(unclosed) = self.open.last() {
            return Err(JugglerError::Normalization {
                message: format!("unclosed <{}>", unclosed),
            });
        }
        Ok(self.out)
    }

    fn write_tag_head(&mut self, name: &str, attributes: &[(String, String)]) {
        self.flush_start();
        self.out.push('<');
        self.out.push_str(name);
        for (key, value) in attributes {
            self.out.push(' ');
            self.out.push_str(key);
            self.out.push_str("=\"");
            self.out.push_str(&escape(value.as_str()));
            self.out.push('"');
        }
    }

    fn flush_start(&mut self) {
        if self.start_pending {
            self.start_pending = false;
            self.out.push('>');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRETTY: &str = r#"
<hostdev mode='subsystem' type='pci' managed='yes'>
  <!-- GPU -->
  <source>
    <address domain='0x0000' bus='0x01' slot='0x00' function='0x0'/>
  </source>
</hostdev>
"#;

    #[test]
    fn test_collapses_formatting() {
        let normalized = normalize(PRETTY).unwrap();
        assert_eq!(
            normalized,
            r#"<hostdev mode="subsystem" type="pci" managed="yes"><source><address domain="0x0000" bus="0x01" slot="0x00" function="0x0"/></source></hostdev>"#
        );
    }

    #[test]
    fn test_is_idempotent() {
        for input in [
            PRETTY,
            "<a>  Some   Text &amp; more </a>",
            "<A B=\"&quot;q&quot;\"><![CDATA[x < y]]></A>",
            "",
        ] {
            let once = normalize(input).unwrap();
            assert_eq!(normalize(&once).unwrap(), once, "input: {:?}", input);
        }
    }

    #[test]
    fn test_folds_case() {
        assert_eq!(
            normalize("<HOSTDEV>X</HOSTDEV>").unwrap(),
            normalize("<hostdev>x</hostdev>").unwrap()
        );
        assert_eq!(normalize("<HostDev>X</hostdev>").unwrap(), "<hostdev>x</hostdev>");
    }

    #[test]
    fn test_empty_element_forms_match() {
        assert_eq!(
            normalize("<address bus='0x01'></address>").unwrap(),
            normalize("<address  bus=\"0x01\" />").unwrap()
        );
    }

    #[test]
    fn test_descriptor_found_in_reformatted_domain() {
        let domain = format!(
            "<domain type='kvm'><name>vm1</name><devices>{}</devices></domain>",
            PRETTY.replace('\n', "").to_uppercase()
        );
        let domain = normalize(&domain).unwrap();
        let device = normalize(PRETTY).unwrap();
        assert!(domain.contains(&device));
    }

    #[test]
    fn test_accepts_cdata_sections() {
        assert_eq!(
            normalize("<A><![CDATA[X < Y]]></A>").unwrap(),
            "<a>x &lt; y</a>"
        );
        assert_eq!(
            normalize("<a><![CDATA[  x < y ]]></a>").unwrap(),
            normalize("<a>x &lt; y</a>").unwrap()
        );
    }

    #[test]
    fn test_keeps_whitespace_only_inside_text() {
        assert_eq!(
            normalize("<p>Hello <b/> World</p>").unwrap(),
            "<p>hello<b/>world</p>"
        );
    }

    #[test]
    fn test_rejects_malformed_xml() {
        assert!(matches!(
            normalize("<hostdev><source></hostdev>"),
            Err(JugglerError::Normalization { .. })
        ));
        assert!(normalize("<hostdev>").is_err());
        assert!(normalize("<a x='1' x='2'/>").is_err());
    }
}
