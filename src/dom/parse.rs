//! Forgiving HTML tokenizer.
//!
//! This is deliberately small: it understands start/end tags with quoted or bare attributes, comments,
//! doctypes, raw-text elements and character references, which covers server-rendered markup.
//! There's no HTML5 error recovery beyond closing the nearest matching open element.

/// Elements that never have children or an end tag.
pub const VOID_ELEMENTS: &[&str] = &["area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source", "track", "wbr"];

/// Elements whose content is not markup.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Start tags that implicitly close an open element of the same name.
pub const SELF_NESTING_FORBIDDEN: &[&str] = &["li", "option", "p", "tr", "td", "th", "dt", "dd"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
	Doctype(String),
	StartTag {
		name: String,
		attributes: Vec<(String, String)>,
		self_closing: bool,
	},
	EndTag(String),
	Comment(String),
	Text(String),
}

#[must_use]
pub fn is_void(name: &str) -> bool {
	VOID_ELEMENTS.contains(&name)
}

#[must_use]
pub fn is_raw_text(name: &str) -> bool {
	matches!(name, "script" | "style")
}

fn is_name_byte(b: u8) -> bool {
	b.is_ascii_alphanumeric() || matches!(b, b':' | b'_' | b'-')
}

fn starts_with_ignore_ascii_case_at(haystack: &[u8], start: usize, needle: &[u8]) -> bool {
	haystack.len() >= start + needle.len() && haystack[start..start + needle.len()].eq_ignore_ascii_case(needle)
}

#[must_use]
#[allow(clippy::too_many_lines)]
pub fn tokenize(input: &str) -> Vec<Token> {
	let bytes = input.as_bytes();
	let len = bytes.len();
	let mut tokens = Vec::new();
	let mut text_start = 0;
	let mut i = 0;

	macro_rules! flush_text {
		($end:expr) => {
			if text_start < $end {
				tokens.push(Token::Text(decode_entities(&input[text_start..$end])));
			}
		};
	}

	while i < len {
		if bytes[i] != b'<' {
			i += 1;
			continue;
		}

		if input[i..].starts_with("<!--") {
			flush_text!(i);
			let body_start = i + 4;
			let (body_end, next) = match input[body_start..].find("-->") {
				Some(offset) => (body_start + offset, body_start + offset + 3),
				None => (len, len),
			};
			tokens.push(Token::Comment(input[body_start..body_end].to_owned()));
			i = next;
			text_start = i;
			continue;
		}

		if matches!(bytes.get(i + 1), Some(b'!' | b'?')) {
			flush_text!(i);
			let end = input[i..].find('>').map_or(len, |offset| i + offset);
			if starts_with_ignore_ascii_case_at(bytes, i, b"<!doctype") {
				tokens.push(Token::Doctype(input[i + 9..end].trim().to_owned()));
			}
			i = (end + 1).min(len);
			text_start = i;
			continue;
		}

		if bytes.get(i + 1) == Some(&b'/') {
			let name_start = i + 2;
			let mut name_end = name_start;
			while name_end < len && is_name_byte(bytes[name_end]) {
				name_end += 1;
			}
			if name_end == name_start {
				// Not a tag, keep it as text.
				i += 1;
				continue;
			}
			flush_text!(i);
			tokens.push(Token::EndTag(input[name_start..name_end].to_ascii_lowercase()));
			let end = input[name_end..].find('>').map_or(len, |offset| name_end + offset);
			i = (end + 1).min(len);
			text_start = i;
			continue;
		}

		if !bytes.get(i + 1).map_or(false, u8::is_ascii_alphabetic) {
			i += 1;
			continue;
		}

		flush_text!(i);
		let name_start = i + 1;
		let mut j = name_start;
		while j < len && is_name_byte(bytes[j]) {
			j += 1;
		}
		let name = input[name_start..j].to_ascii_lowercase();
		let mut attributes = Vec::new();
		let mut self_closing = false;

		loop {
			while j < len && bytes[j].is_ascii_whitespace() {
				j += 1;
			}
			if j >= len {
				break;
			}
			match bytes[j] {
				b'>' => {
					j += 1;
					break;
				}
				b'/' => {
					j += 1;
					if bytes.get(j) == Some(&b'>') {
						self_closing = true;
						j += 1;
						break;
					}
					continue;
				}
				_ => (),
			}

			let attribute_start = j;
			while j < len && !bytes[j].is_ascii_whitespace() && !matches!(bytes[j], b'=' | b'>' | b'/') {
				j += 1;
			}
			if j == attribute_start {
				// Stray `=`.
				j += 1;
				continue;
			}
			let attribute_name = input[attribute_start..j].to_ascii_lowercase();

			let mut k = j;
			while k < len && bytes[k].is_ascii_whitespace() {
				k += 1;
			}
			if bytes.get(k) != Some(&b'=') {
				attributes.push((attribute_name, String::new()));
				continue;
			}
			k += 1;
			while k < len && bytes[k].is_ascii_whitespace() {
				k += 1;
			}
			let value = match bytes.get(k) {
				Some(&quote @ (b'"' | b'\'')) => {
					let value_start = k + 1;
					let value_end = input[value_start..].find(quote as char).map_or(len, |offset| value_start + offset);
					j = (value_end + 1).min(len);
					&input[value_start..value_end]
				}
				_ => {
					let value_start = k;
					while k < len && !bytes[k].is_ascii_whitespace() && bytes[k] != b'>' {
						k += 1;
					}
					j = k;
					&input[value_start..k]
				}
			};
			if !attributes.iter().any(|(existing, _): &(String, String)| *existing == attribute_name) {
				attributes.push((attribute_name, decode_entities(value)));
			}
		}

		let raw = RAW_TEXT_ELEMENTS.contains(&name.as_str()) && !self_closing;
		tokens.push(Token::StartTag {
			name: name.clone(),
			attributes,
			self_closing,
		});
		i = j;
		text_start = i;

		if raw {
			let close = format!("</{}", name);
			let mut scan = i;
			let content_end = loop {
				match input[scan..].find("</") {
					Some(offset) if starts_with_ignore_ascii_case_at(bytes, scan + offset, close.as_bytes()) => break scan + offset,
					Some(offset) => scan += offset + 2,
					None => break len,
				}
			};
			if content_end > i {
				let content = &input[i..content_end];
				tokens.push(Token::Text(if is_raw_text(&name) { content.to_owned() } else { decode_entities(content) }));
			}
			tokens.push(Token::EndTag(name));
			let end = input[content_end..].find('>').map_or(len, |offset| content_end + offset);
			i = (end + 1).min(len);
			text_start = i;
		}
	}
	flush_text!(len);

	tokens
}

/// Decodes the named references markup actually uses plus all numeric ones.
/// Unknown references are kept verbatim.
#[must_use]
pub fn decode_entities(input: &str) -> String {
	if !input.contains('&') {
		return input.to_owned();
	}

	let mut out = String::with_capacity(input.len());
	let mut rest = input;
	while let Some(amp) = rest.find('&') {
		out.push_str(&rest[..amp]);
		rest = &rest[amp..];
		let decoded = rest.find(';').filter(|&semi| semi <= 10).and_then(|semi| {
			let reference = &rest[1..semi];
			let c = match reference {
				"amp" => Some('&'),
				"lt" => Some('<'),
				"gt" => Some('>'),
				"quot" => Some('"'),
				"apos" => Some('\''),
				"nbsp" => Some('\u{a0}'),
				_ => reference.strip_prefix('#').and_then(|number| {
					let code = match number.strip_prefix('x').or_else(|| number.strip_prefix('X')) {
						Some(hex) => u32::from_str_radix(hex, 16).ok(),
						None => number.parse().ok(),
					};
					code.and_then(char::from_u32)
				}),
			};
			c.map(|c| (c, semi + 1))
		});
		match decoded {
			Some((c, consumed)) => {
				out.push(c);
				rest = &rest[consumed..];
			}
			None => {
				out.push('&');
				rest = &rest[1..];
			}
		}
	}
	out.push_str(rest);
	out
}

pub fn escape_text(text: &str, out: &mut String) {
	for c in text.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'\u{a0}' => out.push_str("&nbsp;"),
			c => out.push(c),
		}
	}
}

pub fn escape_attribute(value: &str, out: &mut String) {
	for c in value.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'"' => out.push_str("&quot;"),
			'\u{a0}' => out.push_str("&nbsp;"),
			c => out.push(c),
		}
	}
}
