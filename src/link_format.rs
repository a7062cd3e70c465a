//! CoRE link format (RFC 6690) rendering of the resource registry.
use crate::resource::{Resource, ResourceRegistry};

/// Output window over a rendered listing.
///
/// The first `offset` bytes are skipped and at most `capacity` bytes are
/// kept; `total` counts every byte pushed, so a sink with zero capacity
/// measures the full listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSink {
    offset: usize,
    capacity: usize,
    out: Vec<u8>,
    total: usize,
}

impl LinkSink {
    pub fn new(offset: usize, capacity: usize) -> LinkSink {
        LinkSink {
            offset,
            capacity,
            out: Vec::with_capacity(capacity),
            total: 0,
        }
    }

    /// Sink that keeps nothing and only measures.
    pub fn measure() -> LinkSink {
        LinkSink::new(0, 0)
    }

    pub fn push(&mut self, bytes: &[u8]) {
        let start = self.total;
        self.total += bytes.len();

        let skip = self.offset.saturating_sub(start).min(bytes.len());
        let room = self.capacity - self.out.len();
        let take = (bytes.len() - skip).min(room);
        self.out.extend_from_slice(&bytes[skip..skip + take]);
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// True if bytes past the window were dropped.
    pub fn is_truncated(&self) -> bool {
        self.total > self.offset + self.out.len()
    }

    pub fn output(&self) -> &[u8] {
        &self.out
    }

    pub fn into_output(self) -> Vec<u8> {
        self.out
    }
}

/// Writes the link of one resource, e.g. `</sensors/temp>;rt="temperature";obs`.
pub fn print_link(resource: &Resource, sink: &mut LinkSink) {
    sink.push(b"</");
    sink.push(resource.uri().as_bytes());
    sink.push(b">");
    for attribute in resource.attributes() {
        sink.push(b";");
        sink.push(attribute.name.as_bytes());
        if let Some(value) = &attribute.value {
            sink.push(b"=");
            sink.push(value.as_bytes());
        }
    }
    if resource.is_observable() {
        sink.push(b";obs");
    }
}

/// Resource filter parsed from a `.well-known/core` Uri-Query option such
/// as `rt=temp*` or `href=/sensors/x`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFilter {
    name: String,
    pattern: String,
    match_uri: bool,
    match_substring: bool,
    match_prefix: bool,
}

/// Attributes whose values are space separated lists of tokens.
const TOKEN_LIST_ATTRIBUTES: [&str; 2] = ["rt", "if"];

impl QueryFilter {
    pub fn parse(query: &[u8]) -> Option<QueryFilter> {
        if query.is_empty() {
            return None;
        }
        let query = String::from_utf8_lossy(query);
        let (name, pattern) = match query.split_once('=') {
            Some((name, pattern)) => (name, pattern),
            None => (query.as_ref(), ""),
        };

        let match_uri = name == "href";
        let match_substring = TOKEN_LIST_ATTRIBUTES.contains(&name);
        let mut pattern = pattern;
        if match_uri {
            pattern = pattern.strip_prefix('/').unwrap_or(pattern);
        }
        let match_prefix = pattern.ends_with('*');
        if match_prefix {
            pattern = &pattern[..pattern.len() - 1];
        }

        Some(QueryFilter {
            name: name.to_string(),
            pattern: pattern.to_string(),
            match_uri,
            match_substring,
            match_prefix,
        })
    }

    pub fn matches(&self, resource: &Resource) -> bool {
        if self.match_uri {
            return self.match_text(resource.uri());
        }
        let attribute = match resource.attribute(&self.name) {
            Some(attribute) => attribute,
            None => return false,
        };
        let value = attribute.value.as_deref().unwrap_or("");
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        self.match_text(value)
    }

    fn match_text(&self, text: &str) -> bool {
        if text.len() < self.pattern.len() {
            return false;
        }
        if self.match_substring {
            return text.split(' ').any(|token| self.match_token(token));
        }
        self.match_token(text)
    }

    fn match_token(&self, token: &str) -> bool {
        if self.match_prefix {
            token.starts_with(&self.pattern)
        } else {
            token == self.pattern
        }
    }
}

/// Renders the links of every resource passing `filter`, separated by commas.
pub fn print_wellknown(resources: &ResourceRegistry, sink: &mut LinkSink, filter: Option<&QueryFilter>) {
    let mut subsequent = false;
    for resource in resources.iter() {
        if let Some(filter) = filter {
            if !filter.matches(resource) {
                continue;
            }
        }
        if subsequent {
            sink.push(b",");
        }
        subsequent = true;
        print_link(resource, sink);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn render(resources: &ResourceRegistry, query: &str) -> String {
        let mut sink = LinkSink::new(0, 1024);
        let filter = QueryFilter::parse(query.as_bytes());
        print_wellknown(resources, &mut sink, filter.as_ref());
        String::from_utf8(sink.into_output()).unwrap()
    }

    fn registry() -> ResourceRegistry {
        let mut registry = ResourceRegistry::new();
        let mut temp = Resource::new("sensors/temp")
            .with_attribute("rt", Some("\"temperature-c sensor\""))
            .with_attribute("ct", Some("0"));
        temp.set_observable(true);
        registry.add(temp);
        registry.add(Resource::new("actuators/led").with_attribute("if", Some("\"core.a\"")));
        registry
    }

    #[test]
    fn test_print_link() {
        let resource = Resource::new("/a").with_attribute("title", Some("\"x\"")).with_attribute("ct", None);
        let mut sink = LinkSink::new(0, 64);
        print_link(&resource, &mut sink);
        assert_eq!(sink.output(), b"</a>;title=\"x\";ct");
    }

    #[test]
    fn test_sink_window() {
        let mut sink = LinkSink::new(3, 4);
        sink.push(b"abcdef");
        sink.push(b"ghij");
        assert_eq!(sink.output(), b"defg");
        assert_eq!(sink.total(), 10);
        assert!(sink.is_truncated());

        let mut sink = LinkSink::measure();
        sink.push(b"abc");
        assert_eq!(sink.total(), 3);
        assert!(sink.output().is_empty());
    }

    #[test]
    fn test_filters() {
        let registry = registry();
        let all = render(&registry, "");
        assert_eq!(all.matches(',').count(), 1);
        assert!(all.contains("</sensors/temp>;rt=\"temperature-c sensor\";ct=0;obs"));

        assert_eq!(render(&registry, "rt=sensor"), "</sensors/temp>;rt=\"temperature-c sensor\";ct=0;obs");
        assert_eq!(render(&registry, "rt=temp*"), render(&registry, "rt=sensor"));
        assert_eq!(render(&registry, "rt=temp"), "");
        assert_eq!(render(&registry, "href=/actuators/led"), "</actuators/led>;if=\"core.a\"");
        assert_eq!(render(&registry, "href=actuators*"), "</actuators/led>;if=\"core.a\"");
        assert_eq!(render(&registry, "ct=0"), render(&registry, "rt=sensor"));
        assert_eq!(render(&registry, "title=x"), "");
    }
}
