use tracing::trace;

use crate::{
    config::{Config, Section},
    error::ConfError,
};

/// Converts between raw configuration bytes and [`Config`] records.
pub trait ConfigFormat: Send + Sync {
    /// Decode `bytes`, naming the resulting record `name`.
    fn decode(&self, bytes: &[u8], name: &str) -> Result<Config, ConfError>;

    fn encode(&self, config: &Config) -> Vec<u8>;
}

/// INI-style wg-quick text: `[Section]` headers followed by `Key = Value` lines.
///
/// Input may be UTF-8 (with or without BOM) or UTF-16 with a BOM, as written by
/// some editors. Output is always UTF-8 without BOM.
#[derive(Debug, Clone, Copy, Default)]
pub struct WgQuickFormat;

impl ConfigFormat for WgQuickFormat {
    fn decode(&self, bytes: &[u8], name: &str) -> Result<Config, ConfError> {
        let text = decode_text(bytes).map_err(|reason| ConfError::decode(name, reason))?;
        let sections = parse_sections(&text).map_err(|reason| ConfError::decode(name, reason))?;
        Ok(Config::new(name, sections))
    }

    fn encode(&self, config: &Config) -> Vec<u8> {
        let mut out = String::new();
        for (idx, section) in config.sections.iter().enumerate() {
            if idx > 0 {
                out.push('\n');
            }
            out.push('[');
            out.push_str(&section.name);
            out.push_str("]\n");
            for (key, value) in &section.entries {
                out.push_str(key);
                out.push_str(" = ");
                out.push_str(value);
                out.push('\n');
            }
        }
        out.into_bytes()
    }
}

fn decode_text(bytes: &[u8]) -> Result<String, String> {
    match bytes {
        [0xEF, 0xBB, 0xBF, rest @ ..] => utf8(rest),
        [0xFF, 0xFE, rest @ ..] => {
            trace!("decoding utf-16le configuration");
            utf16(rest, u16::from_le_bytes)
        }
        [0xFE, 0xFF, rest @ ..] => {
            trace!("decoding utf-16be configuration");
            utf16(rest, u16::from_be_bytes)
        }
        _ => utf8(bytes),
    }
}

fn utf8(bytes: &[u8]) -> Result<String, String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| format!("invalid utf-8: {e}"))
}

fn utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Result<String, String> {
    if bytes.len() % 2 != 0 {
        return Err("truncated utf-16 input".to_string());
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|e| format!("invalid utf-16: {e}"))
}

fn parse_sections(text: &str) -> Result<Vec<Section>, String> {
    let mut sections: Vec<Section> = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let lineno = idx + 1;
        let line = match raw.find('#') {
            Some(pos) => &raw[..pos],
            None => raw,
        }
        .trim();
        if line.is_empty() {
            continue;
        }

        if let Some(header) = line.strip_prefix('[') {
            let name = header
                .strip_suffix(']')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .ok_or_else(|| format!("line {lineno}: malformed section header"))?;
            sections.push(Section::new(name));
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| format!("line {lineno}: expected `Key = Value`"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("line {lineno}: empty key"));
        }
        let section = sections
            .last_mut()
            .ok_or_else(|| format!("line {lineno}: entry outside of any section"))?;
        section
            .entries
            .push((key.to_string(), value.trim().to_string()));
    }

    if sections.is_empty() {
        return Err("no sections found".to_string());
    }
    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# exported from a phone
[Interface]
PrivateKey = yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=
Address = 10.0.0.2/32 # primary
DNS = 1.1.1.1

[Peer]
PublicKey = xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=
AllowedIPs = 0.0.0.0/0, ::/0
Endpoint = vpn.example.com:51820
";

    #[test]
    fn decodes_sections_in_order() {
        let cfg = WgQuickFormat
            .decode(SAMPLE.as_bytes(), "phone")
            .expect("decode");
        assert_eq!(cfg.name, "phone");
        assert_eq!(cfg.sections.len(), 2);
        let iface = cfg.section("Interface").expect("interface");
        assert_eq!(iface.get("Address"), Some("10.0.0.2/32"));
        assert_eq!(iface.get("PrivateKey").map(str::len), Some(44));
        let peer = cfg.section("Peer").expect("peer");
        assert_eq!(peer.get("AllowedIPs"), Some("0.0.0.0/0, ::/0"));
    }

    #[test]
    fn encode_then_decode_reproduces_record() {
        let cfg = WgQuickFormat
            .decode(SAMPLE.as_bytes(), "phone")
            .expect("decode");
        let again = WgQuickFormat
            .decode(&WgQuickFormat.encode(&cfg), "phone")
            .expect("decode encoded");
        assert_eq!(again, cfg);
    }

    #[test]
    fn accepts_utf16_with_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "[Interface]\r\nAddress = 10.1.0.1/24\r\n".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let cfg = WgQuickFormat.decode(&bytes, "legacy").expect("decode");
        assert_eq!(
            cfg.section("Interface").and_then(|s| s.get("Address")),
            Some("10.1.0.1/24")
        );
    }

    #[test]
    fn skips_utf8_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"[Peer]\nEndpoint = a:1\n");
        let cfg = WgQuickFormat.decode(&bytes, "bom").expect("decode");
        assert_eq!(cfg.sections[0].name, "Peer");
    }

    #[test]
    fn rejects_malformed_input() {
        let cases: &[&[u8]] = &[
            b"",
            b"# only a comment\n",
            b"Address = 10.0.0.1\n[Interface]\n",
            b"[Interface]\nnot a pair\n",
            b"[Interface]\n = value\n",
            b"[Interface\n",
            b"[Interface]\n\xff\xfe\xfd = x\n",
        ];
        for case in cases {
            let err = WgQuickFormat
                .decode(case, "bad")
                .expect_err("malformed input must fail");
            assert!(matches!(err, ConfError::DecodeFailed { ref name, .. } if name == "bad"));
        }
    }

    #[test]
    fn error_names_the_line() {
        let err = WgQuickFormat
            .decode(b"[Interface]\nAddress = 1\ngarbage\n", "t")
            .expect_err("fails");
        assert!(err.to_string().contains("line 3"), "{err}");
    }
}
