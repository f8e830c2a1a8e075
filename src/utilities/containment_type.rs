/// Relationship between a bounding box and a second box being tested against it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContainmentType {
    /// The boxes share no point.
    Disjoint,
    /// The tested box lies entirely inside (or on the boundary of) the containing box.
    Contains,
    /// The boxes overlap but the tested box pokes out of the containing box.
    Intersects,
}
