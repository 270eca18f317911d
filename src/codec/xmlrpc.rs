//! XML-RPC document encoding and decoding.
//!
//! The wire layout mirrors what the host's own XML-RPC library produces:
//! an `<?xml version='1.0'?>` preamble, one element per line at the top
//! level, `<boolean>` flags encoded as `0`/`1`, strings wrapped in
//! `<string>`, and a trailing newline so the host sees exactly one document
//! per line boundary. Documents carry no length prefix; the receiver tracks
//! tag nesting itself (see [`crate::protocol::DocumentBuffer`]).

use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::Value;
use crate::error::{Error, Result};

/// A decoded top-level XML-RPC document.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    /// `<methodCall>`: a procedure invocation from the peer.
    Call {
        /// Procedure name.
        method: String,
        /// Ordered parameter list.
        params: Vec<Value>,
    },
    /// `<methodResponse>` carrying a single return value.
    Response(Value),
    /// `<methodResponse>` carrying a `<fault>` descriptor.
    Fault {
        /// Numeric fault code.
        code: i32,
        /// Human-readable fault description.
        message: String,
    },
}

/// Encode a procedure call document.
pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut out = String::with_capacity(128);
    out.push_str("<?xml version='1.0'?>\n<methodCall>\n<methodName>");
    push_escaped(&mut out, method);
    out.push_str("</methodName>\n<params>\n");
    for param in params {
        out.push_str("<param>\n");
        encode_value(&mut out, param);
        out.push_str("</param>\n");
    }
    out.push_str("</params>\n</methodCall>\n");
    out
}

/// Encode a response document carrying a single return value.
pub fn encode_response(value: &Value) -> String {
    let mut out = String::with_capacity(128);
    out.push_str("<?xml version='1.0'?>\n<methodResponse>\n<params>\n<param>\n");
    encode_value(&mut out, value);
    out.push_str("</param>\n</params>\n</methodResponse>\n");
    out
}

/// Encode a fault document.
pub fn encode_fault(code: i32, message: &str) -> String {
    let mut out = String::with_capacity(192);
    out.push_str("<?xml version='1.0'?>\n<methodResponse>\n<fault>\n");
    out.push_str("<value><struct>\n<member>\n<name>faultCode</name>\n");
    let _ = write!(out, "<value><int>{code}</int></value>\n");
    out.push_str("</member>\n<member>\n<name>faultString</name>\n<value><string>");
    push_escaped(&mut out, message);
    out.push_str("</string></value>\n</member>\n</struct></value>\n");
    out.push_str("</fault>\n</methodResponse>\n");
    out
}

/// Decode one complete document, as produced by the boundary detector.
pub fn decode(text: &str) -> Result<Document> {
    let mut sc = Scanner::new(text);
    sc.skip_prolog();
    if sc.eat("<methodCall>") {
        let doc = decode_call(&mut sc)?;
        Ok(doc)
    } else if sc.eat("<methodResponse>") {
        let doc = decode_response(&mut sc)?;
        Ok(doc)
    } else {
        Err(Error::Protocol(
            "document is neither a methodCall nor a methodResponse".to_string(),
        ))
    }
}

fn decode_call(sc: &mut Scanner<'_>) -> Result<Document> {
    sc.skip_ws();
    sc.expect("<methodName>")?;
    let method = unescape(sc.text_until_tag());
    sc.expect("</methodName>")?;
    sc.skip_ws();
    let mut params = Vec::new();
    if sc.eat("<params>") {
        loop {
            sc.skip_ws();
            if sc.eat("</params>") {
                break;
            }
            sc.expect("<param>")?;
            sc.skip_ws();
            params.push(decode_value(sc)?);
            sc.skip_ws();
            sc.expect("</param>")?;
        }
        sc.skip_ws();
    }
    sc.expect("</methodCall>")?;
    Ok(Document::Call { method, params })
}

fn decode_response(sc: &mut Scanner<'_>) -> Result<Document> {
    sc.skip_ws();
    let doc = if sc.eat("<fault>") {
        sc.skip_ws();
        let value = decode_value(sc)?;
        sc.skip_ws();
        sc.expect("</fault>")?;
        fault_from_value(value)?
    } else {
        sc.expect("<params>")?;
        sc.skip_ws();
        sc.expect("<param>")?;
        sc.skip_ws();
        let value = decode_value(sc)?;
        sc.skip_ws();
        sc.expect("</param>")?;
        sc.skip_ws();
        sc.expect("</params>")?;
        Document::Response(value)
    };
    sc.skip_ws();
    sc.expect("</methodResponse>")?;
    Ok(doc)
}

fn fault_from_value(value: Value) -> Result<Document> {
    let members = match value {
        Value::Struct(members) => members,
        other => {
            return Err(Error::Protocol(format!(
                "fault body is not a struct: {other}"
            )))
        }
    };
    let code = members
        .get("faultCode")
        .and_then(Value::as_int)
        .ok_or_else(|| Error::Protocol("fault struct has no integer faultCode".to_string()))?;
    let message = members
        .get("faultString")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Protocol("fault struct has no faultString".to_string()))?
        .to_string();
    Ok(Document::Fault { code, message })
}

fn encode_value(out: &mut String, value: &Value) {
    match value {
        Value::Int(n) => {
            let _ = write!(out, "<value><int>{n}</int></value>\n");
        }
        Value::Bool(b) => {
            let _ = write!(out, "<value><boolean>{}</boolean></value>\n", *b as u8);
        }
        Value::Str(s) => {
            out.push_str("<value><string>");
            push_escaped(out, s);
            out.push_str("</string></value>\n");
        }
        Value::Double(d) => {
            let _ = write!(out, "<value><double>{d}</double></value>\n");
        }
        Value::Array(items) => {
            out.push_str("<value><array><data>\n");
            for item in items {
                encode_value(out, item);
            }
            out.push_str("</data></array></value>\n");
        }
        Value::Struct(members) => {
            out.push_str("<value><struct>\n");
            for (name, member) in members {
                out.push_str("<member>\n<name>");
                push_escaped(out, name);
                out.push_str("</name>\n");
                encode_value(out, member);
                out.push_str("</member>\n");
            }
            out.push_str("</struct></value>\n");
        }
    }
}

fn decode_value(sc: &mut Scanner<'_>) -> Result<Value> {
    sc.expect("<value>")?;
    let text = sc.text_until_tag();
    // An untyped <value> body is a string.
    if sc.eat("</value>") {
        return Ok(Value::Str(unescape(text)));
    }
    if !text.trim().is_empty() {
        return Err(Error::Protocol(format!(
            "unexpected text before typed value: {:?}",
            text.trim()
        )));
    }
    let value = if sc.eat("<int>") {
        let v = parse_int(sc.text_until_tag())?;
        sc.expect("</int>")?;
        Value::Int(v)
    } else if sc.eat("<i4>") {
        let v = parse_int(sc.text_until_tag())?;
        sc.expect("</i4>")?;
        Value::Int(v)
    } else if sc.eat("<boolean>") {
        let v = match sc.text_until_tag().trim() {
            "1" | "true" => true,
            "0" | "false" => false,
            other => {
                return Err(Error::Protocol(format!("invalid boolean value: {other:?}")));
            }
        };
        sc.expect("</boolean>")?;
        Value::Bool(v)
    } else if sc.eat("<string/>") {
        Value::Str(String::new())
    } else if sc.eat("<string>") {
        let v = unescape(sc.text_until_tag());
        sc.expect("</string>")?;
        Value::Str(v)
    } else if sc.eat("<double>") {
        let raw = sc.text_until_tag().trim().to_string();
        let v: f64 = raw
            .parse()
            .map_err(|_| Error::Protocol(format!("invalid double value: {raw:?}")))?;
        sc.expect("</double>")?;
        Value::Double(v)
    } else if sc.eat("<array>") {
        sc.skip_ws();
        sc.expect("<data>")?;
        let mut items = Vec::new();
        loop {
            sc.skip_ws();
            if sc.eat("</data>") {
                break;
            }
            items.push(decode_value(sc)?);
        }
        sc.skip_ws();
        sc.expect("</array>")?;
        Value::Array(items)
    } else if sc.eat("<struct>") {
        let mut members = BTreeMap::new();
        loop {
            sc.skip_ws();
            if sc.eat("</struct>") {
                break;
            }
            sc.expect("<member>")?;
            sc.skip_ws();
            sc.expect("<name>")?;
            let name = unescape(sc.text_until_tag());
            sc.expect("</name>")?;
            sc.skip_ws();
            let member = decode_value(sc)?;
            sc.skip_ws();
            sc.expect("</member>")?;
            members.insert(name, member);
        }
        Value::Struct(members)
    } else {
        return Err(Error::Protocol(format!(
            "unknown value type at offset {}",
            sc.pos
        )));
    };
    sc.skip_ws();
    sc.expect("</value>")?;
    Ok(value)
}

fn parse_int(raw: &str) -> Result<i32> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Protocol(format!("invalid integer value: {:?}", raw.trim())))
}

/// Minimal cursor over a complete document's text.
struct Scanner<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
    }

    /// Skip whitespace and the `<?xml ...?>` declaration, if present.
    fn skip_prolog(&mut self) {
        self.skip_ws();
        if self.rest().starts_with("<?") {
            if let Some(end) = self.rest().find("?>") {
                self.pos += end + 2;
            }
            self.skip_ws();
        }
    }

    /// Consume `lit` if the input starts with it (after whitespace).
    fn eat(&mut self, lit: &str) -> bool {
        self.skip_ws();
        if self.rest().starts_with(lit) {
            self.pos += lit.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, lit: &str) -> Result<()> {
        if self.eat(lit) {
            Ok(())
        } else {
            let got: String = self.rest().chars().take(24).collect();
            Err(Error::Protocol(format!("expected {lit}, got {got:?}")))
        }
    }

    /// Raw text from the cursor up to the next `<` (or end of input).
    fn text_until_tag(&mut self) -> &'a str {
        let rest = self.rest();
        let end = rest.find('<').unwrap_or(rest.len());
        self.pos += end;
        &rest[..end]
    }
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest.find(';') else {
            out.push_str(rest);
            return out;
        };
        let entity = &rest[1..semi];
        match entity {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            _ => {
                let decoded = entity
                    .strip_prefix("#x")
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32);
                match decoded {
                    Some(c) => out.push(c),
                    // Unknown entity, keep it verbatim.
                    None => out.push_str(&rest[..semi + 1]),
                }
            }
        }
        rest = &rest[semi + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_call_layout() {
        let doc = encode_call("hook", &[Value::from("id"), Value::from("pluginA")]);
        assert!(doc.starts_with("<?xml version='1.0'?>\n<methodCall>\n"));
        assert!(doc.contains("<methodName>hook</methodName>"));
        assert!(doc.contains("<value><string>pluginA</string></value>"));
        assert!(doc.ends_with("</methodCall>\n"));
    }

    #[test]
    fn test_call_round_trip() {
        let params = vec![
            Value::from("page"),
            Value::Int(3),
            Value::Bool(false),
            Value::Array(vec![Value::from("a"), Value::from("")]),
        ];
        let doc = encode_call("pagetemplate", &params);
        match decode(&doc).unwrap() {
            Document::Call { method, params: p } => {
                assert_eq!(method, "pagetemplate");
                assert_eq!(p, params);
            }
            other => panic!("unexpected document: {other:?}"),
        }
    }

    #[test]
    fn test_response_round_trip() {
        let value = Value::Struct(
            [
                ("count".to_string(), Value::Int(-7)),
                ("title".to_string(), Value::from("a & b <c>")),
            ]
            .into_iter()
            .collect(),
        );
        let doc = encode_response(&value);
        assert_eq!(decode(&doc).unwrap(), Document::Response(value));
    }

    #[test]
    fn test_sentinel_round_trip() {
        let doc = encode_response(&Value::null_sentinel());
        match decode(&doc).unwrap() {
            Document::Response(v) => assert!(v.is_null_sentinel()),
            other => panic!("unexpected document: {other:?}"),
        }
    }

    #[test]
    fn test_empty_string_is_not_sentinel() {
        let doc = encode_response(&Value::Str(String::new()));
        match decode(&doc).unwrap() {
            Document::Response(v) => {
                assert_eq!(v, Value::Str(String::new()));
                assert!(!v.is_null_sentinel());
            }
            other => panic!("unexpected document: {other:?}"),
        }
    }

    #[test]
    fn test_fault_round_trip() {
        let doc = encode_fault(1, "no such method");
        assert_eq!(
            decode(&doc).unwrap(),
            Document::Fault {
                code: 1,
                message: "no such method".to_string()
            }
        );
    }

    #[test]
    fn test_untyped_value_is_string() {
        let doc = "<?xml version='1.0'?>\n<methodResponse>\n<params>\n<param>\n\
                   <value>plain text</value>\n</param>\n</params>\n</methodResponse>\n";
        assert_eq!(
            decode(doc).unwrap(),
            Document::Response(Value::Str("plain text".to_string()))
        );
    }

    #[test]
    fn test_i4_and_boolean_words() {
        let doc = "<methodResponse><params><param>\
                   <value><array><data>\
                   <value><i4>9</i4></value>\
                   <value><boolean>true</boolean></value>\
                   </data></array></value>\
                   </param></params></methodResponse>";
        assert_eq!(
            decode(doc).unwrap(),
            Document::Response(Value::Array(vec![Value::Int(9), Value::Bool(true)]))
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode("<html></html>"), Err(Error::Protocol(_))));
        assert!(matches!(
            decode("<methodCall><methodName>x</methodName><params><param><value><widget/></value></param></params></methodCall>"),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_unescape_entities() {
        assert_eq!(unescape("a &amp; b &lt;c&gt; &#65;&#x42;"), "a & b <c> AB");
        assert_eq!(unescape("&bogus; stays"), "&bogus; stays");
    }

    #[test]
    fn test_call_without_params_block() {
        let doc = "<methodCall><methodName>getargv</methodName></methodCall>";
        assert_eq!(
            decode(doc).unwrap(),
            Document::Call {
                method: "getargv".to_string(),
                params: Vec::new()
            }
        );
    }
}
