//! Paging and sorting values passed to repository methods.
//!
//! `Pageable` and `Sort` are special arguments: the parameter binder recognises them
//! by their declared role and keeps them out of placeholder binding. `Page` is the
//! result shape of paged queries.

use crate::executor::Window;

/// Sort direction for one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn to_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }

    /// Parses `Asc`/`Desc` case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("asc") {
            Some(Direction::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Some(Direction::Desc)
        } else {
            None
        }
    }
}

/// A single sort instruction: property path plus direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Order {
    pub property: String,
    pub direction: Direction,
    pub ignore_case: bool,
}

impl Order {
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Asc,
            ignore_case: false,
        }
    }

    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Desc,
            ignore_case: false,
        }
    }

    pub fn ignore_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }
}

/// Ordered list of sort instructions. An empty sort means "unsorted".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sort {
    orders: Vec<Order>,
}

impl Sort {
    pub fn unsorted() -> Self {
        Self::default()
    }

    pub fn by(orders: impl IntoIterator<Item = Order>) -> Self {
        Self {
            orders: orders.into_iter().collect(),
        }
    }

    /// Appends the orders of `other` after this sort's orders.
    pub fn and(mut self, other: Sort) -> Self {
        self.orders.extend(other.orders);
        self
    }

    pub fn is_sorted(&self) -> bool {
        !self.orders.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Order> {
        self.orders.iter()
    }
}

impl<'a> IntoIterator for &'a Sort {
    type Item = &'a Order;
    type IntoIter = std::slice::Iter<'a, Order>;

    fn into_iter(self) -> Self::IntoIter {
        self.orders.iter()
    }
}

/// Requested page: zero-based index, page size and an optional sort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pageable {
    page_index: u64,
    page_size: u64,
    sort: Sort,
}

impl Pageable {
    /// Returns `None` when `page_size` is zero.
    pub fn new(page_index: u64, page_size: u64) -> Option<Self> {
        Self::with_sort(page_index, page_size, Sort::unsorted())
    }

    pub fn with_sort(page_index: u64, page_size: u64, sort: Sort) -> Option<Self> {
        if page_size == 0 {
            return None;
        }
        Some(Self {
            page_index,
            page_size,
            sort,
        })
    }

    pub fn page_index(&self) -> u64 {
        self.page_index
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    /// Index of the first row on this page. Saturates instead of overflowing.
    pub fn offset(&self) -> u64 {
        self.page_index.saturating_mul(self.page_size)
    }

    pub fn window(&self) -> Window {
        Window {
            offset: self.offset(),
            limit: self.page_size,
        }
    }
}

/// One page of results plus the total number of matching rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    content: Vec<T>,
    total_count: u64,
    page_index: u64,
    page_size: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, pageable: &Pageable, total_count: u64) -> Self {
        Self {
            content,
            total_count,
            page_index: pageable.page_index(),
            page_size: pageable.page_size(),
        }
    }

    /// Everything on one page, for paging calls made without a pageable.
    pub fn unpaged(content: Vec<T>) -> Self {
        let total_count = content.len() as u64;
        Self {
            page_size: total_count.max(1),
            content,
            total_count,
            page_index: 0,
        }
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn page_index(&self) -> u64 {
        self.page_index
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn total_pages(&self) -> u64 {
        self.total_count.div_ceil(self.page_size.max(1))
    }

    pub fn has_next(&self) -> bool {
        self.page_index.saturating_add(1) < self.total_pages()
    }

    pub fn has_previous(&self) -> bool {
        self.page_index > 0
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            total_count: self.total_count,
            page_index: self.page_index,
            page_size: self.page_size,
        }
    }
}
