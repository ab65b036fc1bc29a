//! Page-cursor bookkeeping for list queries.
//!
//! The first response decides how the rest of a result set is fetched:
//!
//! - a `Link: <uri>; rel="next"` header is followed verbatim until a page
//!   arrives without one;
//! - otherwise a `total` count in the envelope drives a `page` query
//!   parameter, incremented until the records received reach `total`;
//! - with neither, the first page is the whole result.
//!
//! [`Pager`] only tracks state; the requests themselves are issued by
//! [`DeskClient::get`](crate::desk_client::DeskClient::get).

use url::{Origin, Url};

use crate::error::DeskError;

/// Query parameter incremented by the total-count strategy.
const PAGE_PARAM: &str = "page";

/// Consecutive empty pages tolerated before a total-count query is abandoned.
const MAX_EMPTY_PAGES: u32 = 3;

/// How the remaining pages of a result set are located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Follow the `rel="next"` Link header.
    LinkHeader,
    /// Increment `page` until `total` records have been received.
    TotalCount {
        /// Record count announced by the first page.
        total: u64,
    },
    /// The first page was complete.
    SinglePage,
}

/// Tracks where the next page of a query lives.
///
/// With the total-count strategy the query also ends after three consecutive
/// pages with no records, even if fewer than `total` have arrived. A server
/// that returns three empty pages and then more records yields fewer than
/// `total` records; the pages after the third empty one are never fetched.
#[derive(Debug, Clone)]
pub struct Pager {
    first: Url,
    origin: Origin,
    next: Option<Url>,
    strategy: Option<Strategy>,
    page: u64,
    received: u64,
    empty_streak: u32,
}

impl Pager {
    /// Starts a query at `first`. Follow-up URIs must share its origin.
    pub fn new(first: Url) -> Self {
        let page = first
            .query_pairs()
            .find(|(key, _)| key == PAGE_PARAM)
            .and_then(|(_, value)| value.parse::<u64>().ok())
            .unwrap_or(1);
        Self {
            origin: first.origin(),
            next: Some(first.clone()),
            first,
            strategy: None,
            page,
            received: 0,
            empty_streak: 0,
        }
    }

    /// The URI to fetch next, `None` once the result set is complete.
    pub fn next_url(&self) -> Option<&Url> {
        self.next.as_ref()
    }

    /// The strategy chosen from the first page, once it has been seen.
    pub fn strategy(&self) -> Option<Strategy> {
        self.strategy
    }

    /// Records received so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Ends the query without another request.
    pub fn finish(&mut self) {
        self.next = None;
    }

    /// Accounts for the page just fetched from `url` and computes the next URI.
    ///
    /// `link` is the raw Link header, `total` the envelope's `total` count and
    /// `records` the number of records the page contributed.
    ///
    /// # Errors
    ///
    /// Returns `DeskError::Validation` if the next link is malformed or points
    /// at another origin.
    pub fn advance(
        &mut self,
        url: &Url,
        link: Option<&str>,
        total: Option<u64>,
        records: usize,
    ) -> Result<(), DeskError> {
        self.received += records as u64;
        let next_link = link.and_then(|header| parse_link_header(header, "next"));

        let strategy = *self.strategy.get_or_insert_with(|| {
            if next_link.is_some() {
                Strategy::LinkHeader
            } else if let Some(total) = total {
                Strategy::TotalCount { total }
            } else {
                Strategy::SinglePage
            }
        });

        self.next = match strategy {
            Strategy::SinglePage => None,
            Strategy::LinkHeader => match next_link {
                Some(next) => Some(self.resolve(url, &next)?),
                None => None,
            },
            Strategy::TotalCount { total } => self.next_numbered_page(total, records),
        };

        Ok(())
    }

    fn next_numbered_page(&mut self, total: u64, records: usize) -> Option<Url> {
        if self.received >= total {
            return None;
        }

        if records == 0 {
            self.empty_streak += 1;
            if self.empty_streak >= MAX_EMPTY_PAGES {
                tracing::warn!(
                    received = self.received,
                    total = total,
                    empty_pages = self.empty_streak,
                    "Server stopped returning records before reaching total; ending query"
                );
                return None;
            }
        } else {
            self.empty_streak = 0;
        }

        self.page += 1;
        Some(with_page(&self.first, self.page))
    }

    fn resolve(&self, current: &Url, next: &str) -> Result<Url, DeskError> {
        let url = current
            .join(next)
            .map_err(|e| DeskError::validation(format!("invalid next-page link: {}", e)))?;
        if url.origin() != self.origin {
            return Err(DeskError::validation(format!(
                "next-page link points at a different host: {}",
                url.origin().ascii_serialization()
            )));
        }
        Ok(url)
    }
}

/// Returns `url` with its `page` parameter set to `page`, other parameters kept.
fn with_page(url: &Url, page: u64) -> Url {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != PAGE_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut next = url.clone();
    next.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair(PAGE_PARAM, &page.to_string());
    next
}

/// Parses a Link header and extracts the URI for the given rel.
///
/// Format: `<https://host/api/v2/tickets?page=2>; rel="next", <...>; rel="prev"`
///
/// URIs may contain commas; only a comma after the closing `>` and outside
/// quotes separates link-values.
pub fn parse_link_header(header: &str, target_rel: &str) -> Option<String> {
    let mut rest = header;
    while let Some(start) = rest.find('<') {
        let after = &rest[start + 1..];
        let end = after.find('>')?;
        let uri = after[..end].trim();
        let (params, remaining) = split_link_params(&after[end + 1..]);

        if link_rels(params).any(|rel| rel.eq_ignore_ascii_case(target_rel)) {
            return Some(uri.to_string());
        }
        rest = remaining;
    }

    None
}

/// Splits one link-value's parameters from the rest of the header.
fn split_link_params(s: &str) -> (&str, &str) {
    let mut quoted = false;
    for (i, c) in s.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => return (&s[..i], &s[i + 1..]),
            _ => {}
        }
    }
    (s, "")
}

/// Relation types named by the `rel` parameters, e.g. `rel="next last"`.
fn link_rels<'a>(params: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    params
        .split(';')
        .filter_map(|param| {
            let (name, value) = param.split_once('=')?;
            name.trim()
                .eq_ignore_ascii_case("rel")
                .then(|| value.trim().trim_matches('"').trim_matches('\''))
        })
        .flat_map(str::split_whitespace)
}
