//! Checks on the shape of broker answers.

/// Validates a collection contains exactly one item when expected to.
pub trait ExactlyOne<T> {
    /// Returns the only item, or the number of items found if that is not one.
    fn exactly_one(self) -> Result<T, usize>;
}

impl<T, I> ExactlyOne<T> for I
where
    I: IntoIterator<Item = T>,
{
    fn exactly_one(self) -> Result<T, usize> {
        let mut iter = self.into_iter();
        match (iter.next(), iter.next()) {
            (Some(v), None) => Ok(v),
            (None, _) => Err(0),
            (Some(_), Some(_)) => Err(2 + iter.count()),
        }
    }
}
