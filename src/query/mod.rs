//! Query engine: condition algebra and typed projection.

pub mod condition;
pub mod value;

pub use condition::{CompareOp, Condition, FromRow, any_equals, any_matches, key};
pub use value::{FromCifValue, Value};

use crate::store::Category;

impl Category {
    /// Project matching rows into typed tuples, one entry per tag:
    ///
    /// ```ignore
    /// for (id, name) in cat.find_as::<(i64, String)>(&cond, &["id", "n"]) { … }
    /// ```
    ///
    /// Rows where any projected cell is null or fails conversion are
    /// skipped.
    pub fn find_as<'a, T: FromRow + 'a>(
        &'a self,
        cond: &Condition,
        tags: &'a [&'a str],
    ) -> impl Iterator<Item = T> + 'a {
        self.find(cond).filter_map(move |row| T::from_row(&row, tags))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_projection() {
        let mut cat = Category::new("t");
        cat.emplace([("id", "1"), ("n", "aap")]).expect("row");
        cat.emplace([("id", "2"), ("n", "noot")]).expect("row");
        cat.emplace([("id", "3"), ("n", "?")]).expect("row");

        let hits: Vec<(i64, String)> = cat
            .find_as(&Condition::All, &["id", "n"])
            .collect();
        assert_eq!(hits, vec![(1, "aap".into()), (2, "noot".into())]);
    }
}
