//! The CSS selector subset patch targets and fingerprints are written in.
//!
//! Supported: type and universal selectors, `#id`, `.class`, attribute selectors with `=`, `~=`, `|=`, `^=`, `$=` and `*=`
//! (quoted or bare values, backslash escapes), the descendant and child combinators, and comma-separated lists.
//! Pseudo-classes are rejected.

use crate::{dom::Dom, error::SelectorError};
use core::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList(Vec<Complex>);

#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
	compounds: Vec<Compound>,
	/// `combinators[i]` joins `compounds[i]` and `compounds[i + 1]`.
	combinators: Vec<Combinator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
	Descendant,
	Child,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
	tag: Option<String>,
	ids: Vec<String>,
	classes: Vec<String>,
	attributes: Vec<AttributeSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttributeSelector {
	name: String,
	test: Option<(AttributeOperator, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttributeOperator {
	Equals,
	Includes,
	DashMatch,
	Prefix,
	Suffix,
	Substring,
}

impl FromStr for SelectorList {
	type Err = SelectorError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Parser { source: s, chars: s.char_indices().collect(), at: 0 }.selector_list()
	}
}

impl SelectorList {
	/// Whether `node` matches any selector in the list.
	pub fn matches<D: Dom>(&self, dom: &D, node: &D::Node) -> bool {
		self.0.iter().any(|complex| complex.matches_from(dom, node, complex.compounds.len() - 1))
	}
}

impl Complex {
	fn matches_from<D: Dom>(&self, dom: &D, node: &D::Node, index: usize) -> bool {
		if !self.compounds[index].matches(dom, node) {
			return false;
		}
		if index == 0 {
			return true;
		}
		match self.combinators[index - 1] {
			Combinator::Child => dom.parent(node).map_or(false, |parent| self.matches_from(dom, &parent, index - 1)),
			Combinator::Descendant => {
				let mut ancestor = dom.parent(node);
				while let Some(candidate) = ancestor {
					if self.matches_from(dom, &candidate, index - 1) {
						return true;
					}
					ancestor = dom.parent(&candidate);
				}
				false
			}
		}
	}
}

impl Compound {
	fn is_empty(&self) -> bool {
		self.tag.is_none() && self.ids.is_empty() && self.classes.is_empty() && self.attributes.is_empty()
	}

	fn matches<D: Dom>(&self, dom: &D, node: &D::Node) -> bool {
		if let Some(tag) = &self.tag {
			if tag != "*" && !dom.tag_name(node).eq_ignore_ascii_case(tag) {
				return false;
			}
		}
		if self.ids.is_empty() && self.classes.is_empty() && self.attributes.is_empty() {
			return true;
		}

		let attributes = dom.attributes(node);
		let get = |name: &str| attributes.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str());

		self.ids.iter().all(|id| get("id") == Some(id.as_str()))
			&& self.classes.iter().all(|class| get("class").map_or(false, |list| list.split_ascii_whitespace().any(|c| c == class)))
			&& self.attributes.iter().all(|attribute| match (get(attribute.name.as_str()), &attribute.test) {
				(None, _) => false,
				(Some(_), None) => true,
				(Some(actual), Some((operator, expected))) => match operator {
					AttributeOperator::Equals => actual == expected,
					AttributeOperator::Includes => actual.split_ascii_whitespace().any(|token| token == expected),
					AttributeOperator::DashMatch => actual == expected || actual.strip_prefix(expected.as_str()).map_or(false, |rest| rest.starts_with('-')),
					AttributeOperator::Prefix => !expected.is_empty() && actual.starts_with(expected.as_str()),
					AttributeOperator::Suffix => !expected.is_empty() && actual.ends_with(expected.as_str()),
					AttributeOperator::Substring => !expected.is_empty() && actual.contains(expected.as_str()),
				},
			})
	}
}

/// Escapes `value` for use inside a double-quoted attribute selector value.
#[must_use]
pub fn escape_quoted(value: &str) -> String {
	let mut out = String::with_capacity(value.len());
	for c in value.chars() {
		if c == '"' || c == '\\' {
			out.push('\\');
		}
		out.push(c);
	}
	out
}

/// Escapes `ident` so it parses back as one identifier.
#[must_use]
pub fn escape_ident(ident: &str) -> String {
	let mut out = String::with_capacity(ident.len());
	for c in ident.chars() {
		if !is_ident_char(c) {
			out.push('\\');
		}
		out.push(c);
	}
	out
}

fn is_ident_char(c: char) -> bool {
	c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

struct Parser<'a> {
	source: &'a str,
	chars: Vec<(usize, char)>,
	at: usize,
}

impl Parser<'_> {
	fn peek(&self) -> Option<char> {
		self.chars.get(self.at).map(|&(_, c)| c)
	}

	fn unexpected(&self) -> SelectorError {
		match self.chars.get(self.at) {
			Some(&(at, found)) => SelectorError::Unexpected {
				selector: self.source.to_owned(),
				found,
				at,
			},
			None => SelectorError::Empty,
		}
	}

	fn skip_whitespace(&mut self) -> bool {
		let start = self.at;
		while self.peek().map_or(false, char::is_whitespace) {
			self.at += 1;
		}
		self.at != start
	}

	fn selector_list(mut self) -> Result<SelectorList, SelectorError> {
		let mut list = Vec::new();
		loop {
			self.skip_whitespace();
			if self.peek().is_none() {
				return Err(SelectorError::Empty);
			}
			list.push(self.complex()?);
			match self.peek() {
				Some(',') => self.at += 1,
				None => return Ok(SelectorList(list)),
				Some(_) => return Err(self.unexpected()),
			}
		}
	}

	fn complex(&mut self) -> Result<Complex, SelectorError> {
		let mut compounds = vec![self.compound()?];
		let mut combinators = Vec::new();
		loop {
			let had_whitespace = self.skip_whitespace();
			let combinator = match self.peek() {
				None | Some(',') => break,
				Some('>') => {
					self.at += 1;
					self.skip_whitespace();
					Combinator::Child
				}
				Some(_) if had_whitespace => Combinator::Descendant,
				Some(_) => return Err(self.unexpected()),
			};
			combinators.push(combinator);
			compounds.push(self.compound()?);
		}
		Ok(Complex { compounds, combinators })
	}

	fn compound(&mut self) -> Result<Compound, SelectorError> {
		let mut compound = Compound::default();
		match self.peek() {
			Some('*') => {
				self.at += 1;
				compound.tag = Some("*".to_owned());
			}
			Some(c) if is_ident_char(c) || c == '\\' => compound.tag = Some(self.ident()?.to_ascii_lowercase()),
			_ => (),
		}
		loop {
			match self.peek() {
				Some('#') => {
					self.at += 1;
					compound.ids.push(self.ident()?);
				}
				Some('.') => {
					self.at += 1;
					compound.classes.push(self.ident()?);
				}
				Some('[') => {
					self.at += 1;
					compound.attributes.push(self.attribute()?);
				}
				_ => break,
			}
		}
		if compound.is_empty() {
			return Err(self.unexpected());
		}
		Ok(compound)
	}

	fn ident(&mut self) -> Result<String, SelectorError> {
		let mut ident = String::new();
		loop {
			match self.peek() {
				Some('\\') => {
					self.at += 1;
					match self.peek() {
						Some(c) => {
							ident.push(c);
							self.at += 1;
						}
						None => {
							return Err(SelectorError::Unterminated {
								selector: self.source.to_owned(),
								what: "escape",
							})
						}
					}
				}
				Some(c) if is_ident_char(c) => {
					ident.push(c);
					self.at += 1;
				}
				_ => break,
			}
		}
		if ident.is_empty() {
			return Err(self.unexpected());
		}
		Ok(ident)
	}

	fn attribute(&mut self) -> Result<AttributeSelector, SelectorError> {
		self.skip_whitespace();
		let name = self.ident()?.to_ascii_lowercase();
		self.skip_whitespace();
		let operator = match self.peek() {
			Some(']') => {
				self.at += 1;
				return Ok(AttributeSelector { name, test: None });
			}
			Some('=') => {
				self.at += 1;
				AttributeOperator::Equals
			}
			Some(c @ ('~' | '|' | '^' | '$' | '*')) => {
				self.at += 1;
				if self.peek() != Some('=') {
					return Err(self.unexpected());
				}
				self.at += 1;
				match c {
					'~' => AttributeOperator::Includes,
					'|' => AttributeOperator::DashMatch,
					'^' => AttributeOperator::Prefix,
					'$' => AttributeOperator::Suffix,
					_ => AttributeOperator::Substring,
				}
			}
			_ => return Err(self.unexpected()),
		};
		self.skip_whitespace();
		let value = match self.peek() {
			Some(quote @ ('"' | '\'')) => {
				self.at += 1;
				let mut value = String::new();
				loop {
					match self.peek() {
						Some('\\') => {
							self.at += 1;
							if let Some(c) = self.peek() {
								value.push(c);
								self.at += 1;
							}
						}
						Some(c) if c == quote => {
							self.at += 1;
							break value;
						}
						Some(c) => {
							value.push(c);
							self.at += 1;
						}
						None => {
							return Err(SelectorError::Unterminated {
								selector: self.source.to_owned(),
								what: "string",
							})
						}
					}
				}
			}
			_ => self.ident()?,
		};
		self.skip_whitespace();
		if self.peek() != Some(']') {
			return Err(match self.peek() {
				None => SelectorError::Unterminated {
					selector: self.source.to_owned(),
					what: "attribute selector",
				},
				Some(_) => self.unexpected(),
			});
		}
		self.at += 1;
		Ok(AttributeSelector {
			name,
			test: Some((operator, value)),
		})
	}
}
