use std::marker::PhantomData;

use crate::error::Result;
use crate::types::{ListOptions, Page, RepositoryHost, Repository};

/// Lazy, finite walk over a paged listing.
///
/// Yields one item batch per page and stops after the last page or the first
/// error.
pub struct Pages<T, F> {
    fetch: F,
    next: Option<u32>,
    per_page: u32,
    _item: PhantomData<fn() -> T>,
}

pub fn paginate<T, F>(per_page: u32, fetch: F) -> Pages<T, F>
where
    F: FnMut(ListOptions) -> Result<Page<T>>,
{
    Pages { fetch, next: Some(1), per_page, _item: PhantomData }
}

impl<T, F> Iterator for Pages<T, F>
where
    F: FnMut(ListOptions) -> Result<Page<T>>,
{
    type Item = Result<Vec<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        let page = self.next.take()?;
        match (self.fetch)(ListOptions { page, per_page: self.per_page }) {
            Ok(p) => {
                // a next page that does not move forward would loop forever
                self.next = p.next_page.filter(|n| *n > page);
                Some(Ok(p.items))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Every repository of `org`, page by page.
pub fn org_repositories<'a>(
    host: &'a dyn RepositoryHost,
    org: &'a str,
    per_page: u32,
) -> Pages<Repository, impl FnMut(ListOptions) -> Result<Page<Repository>> + 'a> {
    paginate(per_page, move |opts| host.list_org_repositories(org, opts))
}
