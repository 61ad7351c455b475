//! Name lookups over a fetched static DNS listing

use super::RouterRecord;

/// Find the record registered under `name`.
///
/// The router is not expected to hold duplicate names; if it does, the first
/// entry in list order is returned.
pub fn find_by_name<'a>(records: &'a [RouterRecord], name: &str) -> Option<&'a RouterRecord> {
    records.iter().find(|record| record.name == name)
}

/// All records registered under `name`, in list order
pub fn matching_records<'a>(
    records: &'a [RouterRecord],
    name: &'a str,
) -> impl Iterator<Item = &'a RouterRecord> + 'a {
    records.iter().filter(move |record| record.name == name)
}
