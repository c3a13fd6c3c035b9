//! Method name parsing for derived queries.
//!
//! `findDistinctByLastNameAndAgeGreaterThanOrderByFirstNameDesc` becomes a
//! [`PartTree`]: an OR of AND-groups of [`Part`]s plus a static ordering. Every
//! property reference is resolved against entity metadata while parsing, so an
//! unknown property fails repository construction rather than a later call.

use crate::domain::{Direction, Order};
use crate::metadata::EntityInformation;
use crate::query::error::ConstructionError;
use once_cell::sync::Lazy;
use regex::Regex;

static PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(find|read|get|query)(\w*?)By(\w*)$").expect("valid method prefix regex")
});

static BARE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(find|read|get|query)(\p{Lu}\w*)?$").expect("valid bare prefix regex")
});

const ORDER_BY: &str = "OrderBy";
const ALL_IGNORE_CASE: [&str; 2] = ["AllIgnoreCase", "AllIgnoringCase"];
const IGNORE_CASE: [&str; 2] = ["IgnoreCase", "IgnoringCase"];

/// Predicate operator of one part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartKind {
    IsNotNull,
    IsNull,
    Between,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    Before,
    After,
    NotLike,
    Like,
    StartingWith,
    EndingWith,
    Containing,
    NotIn,
    In,
    True,
    False,
    NegatingSimpleProperty,
    SimpleProperty,
}

impl PartKind {
    /// Matching precedence: a kind earlier in this list wins over a later one whose
    /// keyword is a suffix of it (`IsNotNull` before `IsNull`).
    const ALL: [PartKind; 20] = [
        PartKind::IsNotNull,
        PartKind::IsNull,
        PartKind::Between,
        PartKind::LessThanEqual,
        PartKind::LessThan,
        PartKind::GreaterThanEqual,
        PartKind::GreaterThan,
        PartKind::Before,
        PartKind::After,
        PartKind::NotLike,
        PartKind::Like,
        PartKind::StartingWith,
        PartKind::EndingWith,
        PartKind::Containing,
        PartKind::NotIn,
        PartKind::In,
        PartKind::True,
        PartKind::False,
        PartKind::NegatingSimpleProperty,
        PartKind::SimpleProperty,
    ];

    fn keywords(self) -> &'static [&'static str] {
        match self {
            PartKind::IsNotNull => &["IsNotNull", "NotNull"],
            PartKind::IsNull => &["IsNull", "Null"],
            PartKind::Between => &["IsBetween", "Between"],
            PartKind::LessThan => &["IsLessThan", "LessThan"],
            PartKind::LessThanEqual => &["IsLessThanEqual", "LessThanEqual"],
            PartKind::GreaterThan => &["IsGreaterThan", "GreaterThan"],
            PartKind::GreaterThanEqual => &["IsGreaterThanEqual", "GreaterThanEqual"],
            PartKind::Before => &["IsBefore", "Before"],
            PartKind::After => &["IsAfter", "After"],
            PartKind::NotLike => &["IsNotLike", "NotLike"],
            PartKind::Like => &["IsLike", "Like"],
            PartKind::StartingWith => &["IsStartingWith", "StartingWith", "StartsWith"],
            PartKind::EndingWith => &["IsEndingWith", "EndingWith", "EndsWith"],
            PartKind::Containing => &["IsContaining", "Containing", "Contains"],
            PartKind::NotIn => &["IsNotIn", "NotIn"],
            PartKind::In => &["IsIn", "In"],
            PartKind::True => &["IsTrue", "True"],
            PartKind::False => &["IsFalse", "False"],
            PartKind::NegatingSimpleProperty => &["IsNot", "Not"],
            PartKind::SimpleProperty => &["Is", "Equals"],
        }
    }

    /// Number of arguments the part consumes.
    pub fn arity(self) -> usize {
        match self {
            PartKind::Between => 2,
            PartKind::IsNull | PartKind::IsNotNull | PartKind::True | PartKind::False => 0,
            _ => 1,
        }
    }

    /// Splits a raw part into property source and operator.
    fn detect(source: &str) -> (&str, PartKind) {
        for kind in PartKind::ALL {
            for keyword in kind.keywords() {
                if source.len() > keyword.len() && source.ends_with(keyword) {
                    return (&source[..source.len() - keyword.len()], kind);
                }
            }
        }
        (source, PartKind::SimpleProperty)
    }
}

/// One predicate: resolved property path, operator, case sensitivity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub property: String,
    pub kind: PartKind,
    pub ignore_case: bool,
}

/// Parsed method name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartTree {
    pub distinct: bool,
    /// OR of AND-groups. Empty means "no criteria".
    pub predicate: Vec<Vec<Part>>,
    pub order_by: Vec<Order>,
}

impl PartTree {
    /// Parses `method` and resolves every property against `entity`.
    ///
    /// # Errors
    ///
    /// `InvalidMethodName` when the name has no recognised prefix or an empty part,
    /// `UnknownProperty` when a part or ordering names an unmapped property.
    pub fn parse(method: &str, entity: &dyn EntityInformation) -> Result<Self, ConstructionError> {
        let (subject, criteria) = if let Some(caps) = PREFIX.captures(method) {
            (caps[2].to_string(), caps[3].to_string())
        } else if let Some(caps) = BARE_PREFIX.captures(method) {
            (caps.get(2).map_or(String::new(), |m| m.as_str().to_string()), String::new())
        } else {
            return Err(invalid(method, "expected a find/read/get/query prefix"));
        };

        let (mut predicate_source, order_source) = match criteria.find(ORDER_BY) {
            Some(pos) => (&criteria[..pos], Some(&criteria[pos + ORDER_BY.len()..])),
            None => (criteria.as_str(), None),
        };

        let mut all_ignore_case = false;
        for suffix in ALL_IGNORE_CASE {
            if let Some(stripped) = predicate_source.strip_suffix(suffix) {
                predicate_source = stripped;
                all_ignore_case = true;
                break;
            }
        }

        let mut predicate = Vec::new();
        if !predicate_source.is_empty() {
            for or_source in split_keyword(predicate_source, "Or") {
                let mut group = Vec::new();
                for and_source in split_keyword(or_source, "And") {
                    group.push(parse_part(method, and_source, all_ignore_case, entity)?);
                }
                predicate.push(group);
            }
        }

        let order_by = match order_source {
            Some(source) => parse_order_by(method, source, entity)?,
            None => Vec::new(),
        };

        Ok(Self {
            distinct: subject.contains("Distinct"),
            predicate,
            order_by,
        })
    }

    pub fn parts(&self) -> impl Iterator<Item = &Part> {
        self.predicate.iter().flatten()
    }

    /// Total number of arguments consumed by all parts.
    pub fn arity(&self) -> usize {
        self.parts().map(|p| p.kind.arity()).sum()
    }
}

fn invalid(method: &str, reason: impl Into<String>) -> ConstructionError {
    ConstructionError::InvalidMethodName {
        method: method.to_string(),
        reason: reason.into(),
    }
}

fn parse_part(
    method: &str,
    source: &str,
    all_ignore_case: bool,
    entity: &dyn EntityInformation,
) -> Result<Part, ConstructionError> {
    if source.is_empty() {
        return Err(invalid(method, "empty predicate part"));
    }

    let mut source = source;
    let mut ignore_case = all_ignore_case;
    for suffix in IGNORE_CASE {
        if let Some(stripped) = source.strip_suffix(suffix) {
            source = stripped;
            ignore_case = true;
            break;
        }
    }

    let (property_source, kind) = PartKind::detect(source);
    let property = resolve_property(method, property_source, entity)?;
    Ok(Part {
        property,
        kind,
        ignore_case,
    })
}

/// `LastNameAscFirstNameDesc` -> `[lastName ASC, firstName DESC]`. A trailing
/// property without direction sorts ascending.
fn parse_order_by(
    method: &str,
    source: &str,
    entity: &dyn EntityInformation,
) -> Result<Vec<Order>, ConstructionError> {
    if source.is_empty() {
        return Err(invalid(method, "OrderBy without properties"));
    }

    let mut orders = Vec::new();
    let mut rest = source;
    while !rest.is_empty() {
        let (segment, direction, consumed) = next_order_segment(rest);
        if segment.is_empty() {
            return Err(invalid(method, "OrderBy direction without property"));
        }
        let property = resolve_property(method, segment, entity)?;
        orders.push(Order {
            property,
            direction,
            ignore_case: false,
        });
        rest = &rest[consumed..];
    }
    Ok(orders)
}

fn next_order_segment(source: &str) -> (&str, Direction, usize) {
    let bytes = source.as_bytes();
    for i in 1..source.len() {
        if !source.is_char_boundary(i) {
            continue;
        }
        for (keyword, direction) in [("Asc", Direction::Asc), ("Desc", Direction::Desc)] {
            let end = i + keyword.len();
            if source[i..].starts_with(keyword)
                && (end == source.len() || bytes[end].is_ascii_uppercase())
            {
                return (&source[..i], direction, end);
            }
        }
    }
    (source, Direction::Asc, source.len())
}

/// Splits on `keyword` where it is followed by an uppercase letter.
fn split_keyword<'a>(source: &'a str, keyword: &str) -> Vec<&'a str> {
    let bytes = source.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 1;
    while i + keyword.len() < source.len() {
        let end = i + keyword.len();
        if source.is_char_boundary(i)
            && source[i..].starts_with(keyword)
            && bytes[end].is_ascii_uppercase()
        {
            parts.push(&source[start..i]);
            start = end;
            i = end + 1;
        } else {
            i += 1;
        }
    }
    parts.push(&source[start..]);
    parts
}

/// Resolves a capitalised property source to a mapped path.
///
/// `_` marks explicit path boundaries. Without it, the whole source is tried first,
/// then every way of splitting at camel-case humps, fewest segments first.
fn resolve_property(
    method: &str,
    source: &str,
    entity: &dyn EntityInformation,
) -> Result<String, ConstructionError> {
    let unknown = || ConstructionError::UnknownProperty {
        method: method.to_string(),
        property: uncapitalize(source),
        entity: entity.entity_name().to_string(),
    };

    if source.is_empty() {
        return Err(invalid(method, "missing property name"));
    }

    if source.contains('_') {
        let path = source
            .split('_')
            .map(uncapitalize)
            .collect::<Vec<_>>()
            .join(".");
        return if entity.property_exists(&path) {
            Ok(path)
        } else {
            Err(unknown())
        };
    }

    let humps: Vec<usize> = source
        .char_indices()
        .skip(1)
        .filter(|(_, c)| c.is_uppercase())
        .map(|(i, _)| i)
        .collect();

    let mut candidates: Vec<Vec<usize>> = (0u32..(1u32 << humps.len().min(16)))
        .map(|mask| {
            humps
                .iter()
                .enumerate()
                .filter(|(bit, _)| (mask >> *bit) & 1 == 1)
                .map(|(_, &pos)| pos)
                .collect()
        })
        .collect();
    // fewest segments first, rightmost splits first among equals
    candidates.sort_by(|a: &Vec<usize>, b: &Vec<usize>| a.len().cmp(&b.len()).then_with(|| b.cmp(a)));

    for splits in candidates {
        let mut segments = Vec::with_capacity(splits.len() + 1);
        let mut start = 0;
        for pos in splits {
            segments.push(uncapitalize(&source[start..pos]));
            start = pos;
        }
        segments.push(uncapitalize(&source[start..]));
        let path = segments.join(".");
        if entity.property_exists(&path) {
            return Ok(path);
        }
    }

    Err(unknown())
}

fn uncapitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::EntityMetadata;

    fn user() -> EntityMetadata {
        EntityMetadata::builder("User", "users")
            .column("firstName")
            .column("lastName")
            .column("age")
            .column("active")
            .column("order")
            .column("description")
            .column("address.city")
            .column("address.zipCode")
            .build()
    }

    #[test]
    fn test_simple_equality() {
        let tree = PartTree::parse("findByLastName", &user()).unwrap();
        assert_eq!(
            tree.predicate,
            vec![vec![Part {
                property: "lastName".into(),
                kind: PartKind::SimpleProperty,
                ignore_case: false
            }]]
        );
        assert_eq!(tree.arity(), 1);
    }

    #[test]
    fn test_and_or_groups() {
        let tree = PartTree::parse("findByFirstNameAndLastNameOrAgeGreaterThan", &user()).unwrap();
        assert_eq!(tree.predicate.len(), 2);
        assert_eq!(tree.predicate[0].len(), 2);
        assert_eq!(tree.predicate[1][0].kind, PartKind::GreaterThan);
        assert_eq!(tree.arity(), 3);
    }

    #[test]
    fn test_operator_precedence() {
        let tree = PartTree::parse("findByAgeLessThanEqualAndLastNameIsNotNull", &user()).unwrap();
        let kinds: Vec<_> = tree.parts().map(|p| p.kind).collect();
        assert_eq!(kinds, [PartKind::LessThanEqual, PartKind::IsNotNull]);
        assert_eq!(tree.arity(), 1);
    }

    #[test]
    fn test_between_consumes_two() {
        let tree = PartTree::parse("findByAgeBetween", &user()).unwrap();
        assert_eq!(tree.arity(), 2);
    }

    #[test]
    fn test_boolean_and_negation() {
        let tree = PartTree::parse("findByActiveTrueAndLastNameNot", &user()).unwrap();
        let kinds: Vec<_> = tree.parts().map(|p| p.kind).collect();
        assert_eq!(kinds, [PartKind::True, PartKind::NegatingSimpleProperty]);
    }

    #[test]
    fn test_ignore_case() {
        let tree = PartTree::parse("findByLastNameIgnoreCaseAndFirstName", &user()).unwrap();
        let flags: Vec<_> = tree.parts().map(|p| p.ignore_case).collect();
        assert_eq!(flags, [true, false]);

        let tree = PartTree::parse("findByLastNameAndFirstNameAllIgnoreCase", &user()).unwrap();
        assert!(tree.parts().all(|p| p.ignore_case));
    }

    #[test]
    fn test_nested_property_by_camel_case() {
        let tree = PartTree::parse("findByAddressCity", &user()).unwrap();
        assert_eq!(tree.predicate[0][0].property, "address.city");
    }

    #[test]
    fn test_nested_property_by_underscore() {
        let tree = PartTree::parse("findByAddress_ZipCode", &user()).unwrap();
        assert_eq!(tree.predicate[0][0].property, "address.zipCode");
    }

    #[test]
    fn test_or_inside_property_name_is_not_split() {
        let tree = PartTree::parse("findByOrder", &user()).unwrap();
        assert_eq!(tree.predicate[0][0].property, "order");
    }

    #[test]
    fn test_order_by_suffix() {
        let tree = PartTree::parse("findByAgeOrderByLastNameAscDescriptionDesc", &user()).unwrap();
        assert_eq!(
            tree.order_by,
            vec![Order::asc("lastName"), Order::desc("description")]
        );
    }

    #[test]
    fn test_order_by_without_direction_defaults_to_asc() {
        let tree = PartTree::parse("findAllByOrderByFirstName", &user()).unwrap();
        assert!(tree.predicate.is_empty());
        assert_eq!(tree.order_by, vec![Order::asc("firstName")]);
    }

    #[test]
    fn test_distinct_and_bare_find_all() {
        let tree = PartTree::parse("findDistinctByLastName", &user()).unwrap();
        assert!(tree.distinct);

        let tree = PartTree::parse("findAll", &user()).unwrap();
        assert!(tree.predicate.is_empty());
        assert_eq!(tree.arity(), 0);
    }

    #[test]
    fn test_unknown_property_fails() {
        let err = PartTree::parse("findByNickname", &user()).unwrap_err();
        assert_eq!(
            err,
            ConstructionError::UnknownProperty {
                method: "findByNickname".into(),
                property: "nickname".into(),
                entity: "User".into()
            }
        );
    }

    #[test]
    fn test_unknown_order_property_fails() {
        let err = PartTree::parse("findByAgeOrderByNicknameAsc", &user()).unwrap_err();
        assert!(matches!(err, ConstructionError::UnknownProperty { .. }));
    }

    #[test]
    fn test_unrecognised_prefix_fails() {
        let err = PartTree::parse("deleteByLastName", &user()).unwrap_err();
        assert!(matches!(err, ConstructionError::InvalidMethodName { .. }));
    }

    #[test]
    fn test_split_keyword() {
        assert_eq!(split_keyword("FirstNameAndLastName", "And"), ["FirstName", "LastName"]);
        assert_eq!(split_keyword("Order", "Or"), ["Order"]);
        assert_eq!(split_keyword("Brand", "And"), ["Brand"]);
    }
}
