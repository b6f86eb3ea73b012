//! Small standalone helpers shared by the TP and peer state engines.

use itertools::Itertools;

/// Find an element that appears more than `threshold` times, used to
/// determine the majority-agreed echo digest at each verify-broadcast
/// step.
pub fn find_frequent_element<T, Iter>(iter: Iter, threshold: usize) -> Option<T>
where
	T: Clone + std::fmt::Debug + Ord,
	Iter: Iterator<Item = T>,
{
	iter.sorted_unstable()
		.group_by(|x| x.clone())
		.into_iter()
		.map(|(_, mut group)| {
			let first = group.next().expect("must have at least one element");
			(first, group.count() + 1)
		})
		.find(|(_, count)| *count > threshold)
		.map(|(x, _)| x)
}
