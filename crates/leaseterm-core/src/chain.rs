//! Ordered, non-overlapping chains of dated members.
//!
//! A chain stores its members as segments in an arena ordered by start
//! date. Members belong to a group (for example all terms of one lease
//! item, or all occupancies of one unit); predecessor, successor and
//! timeline are derived by position inside the member's own group rather
//! than by stored links.
//!
//! The chain owns every member's interval. Interval changes only happen
//! through [`IntervalChain::insert`], [`IntervalChain::change_dates`],
//! [`IntervalChain::succeeded_by`], [`IntervalChain::preceded_by`] and
//! [`IntervalChain::detach_last`]. Each of them validates the request,
//! stages the resulting boundaries, re-checks the whole group and only
//! then applies the change.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::LeaseError;
use crate::interval::{next_day, previous_day, DateInterval};
use crate::LeaseResult;

/// Identifier of a member, unique within its chain.
pub type MemberId = u32;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Something that can live in an [`IntervalChain`].
pub trait ChainMember {
    /// Members with equal groups form one timeline.
    type Group: PartialEq + Clone + fmt::Debug;

    /// Whether consecutive members of a group must touch without gaps.
    const CONTIGUOUS: bool = true;

    fn group(&self) -> Self::Group;
}

/// Builds the member inserted by [`IntervalChain::succeeded_by`] and
/// [`IntervalChain::preceded_by`].
pub trait MemberFactory<T> {
    fn new_member(self, interval: &DateInterval) -> T;
}

impl<T, F> MemberFactory<T> for F
where
    F: FnOnce(&DateInterval) -> T,
{
    fn new_member(self, interval: &DateInterval) -> T {
        self(interval)
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One member of a chain together with the interval the chain assigned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment<T> {
    id: MemberId,
    interval: DateInterval,
    member: T,
}

impl<T> Segment<T> {
    pub fn id(&self) -> MemberId {
        self.id
    }

    pub fn interval(&self) -> DateInterval {
        self.interval
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.interval.start_date()
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.interval.end_date()
    }

    pub fn member(&self) -> &T {
        &self.member
    }

    fn sort_key(&self) -> (Option<NaiveDate>, MemberId) {
        (self.interval.start_date(), self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "RawChain<T>",
    bound(
        serialize = "T: Serialize",
        deserialize = "T: Deserialize<'de> + ChainMember + Clone"
    )
)]
pub struct IntervalChain<T> {
    segments: Vec<Segment<T>>,
    next_id: MemberId,
}

#[derive(Deserialize)]
struct RawChain<T> {
    #[serde(default = "Vec::new")]
    segments: Vec<Segment<T>>,
    #[serde(default)]
    next_id: MemberId,
}

impl<T: ChainMember + Clone> TryFrom<RawChain<T>> for IntervalChain<T> {
    type Error = LeaseError;

    fn try_from(raw: RawChain<T>) -> Result<Self, Self::Error> {
        let mut segments = raw.segments;
        let mut seen = BTreeSet::new();
        let mut next_id = raw.next_id;
        for s in &segments {
            if !seen.insert(s.id) {
                return Err(LeaseError::invariant(format!(
                    "duplicate chain member id {}",
                    s.id
                )));
            }
            next_id = next_id.max(id_after(s.id)?);
        }
        segments.sort_by_key(|s| s.sort_key());
        let chain = IntervalChain { segments, next_id };
        chain.check_integrity()?;
        Ok(chain)
    }
}

impl<T> Default for IntervalChain<T> {
    fn default() -> Self {
        IntervalChain {
            segments: Vec::new(),
            next_id: 0,
        }
    }
}

/// Boundary changes collected before anything is applied.
struct Staged<T> {
    adjustments: Vec<(MemberId, DateInterval)>,
    insertion: Option<Segment<T>>,
    removal: Option<MemberId>,
}

impl<T> Staged<T> {
    fn adjust(adjustments: Vec<(MemberId, DateInterval)>) -> Self {
        Staged {
            adjustments,
            insertion: None,
            removal: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

impl<T: ChainMember + Clone> IntervalChain<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// All segments, oldest first.
    pub fn segments(&self) -> &[Segment<T>] {
        &self.segments
    }

    /// Presentation order: start date descending, undated starts last.
    pub fn ordered_desc(&self) -> impl Iterator<Item = &Segment<T>> {
        self.segments.iter().rev()
    }

    pub fn get(&self, id: MemberId) -> Option<&Segment<T>> {
        self.segments.iter().find(|s| s.id == id)
    }

    /// Like [`get`](Self::get) but reports a missing member as an error.
    pub fn segment(&self, id: MemberId) -> LeaseResult<&Segment<T>> {
        self.get(id)
            .ok_or_else(|| LeaseError::NotFound(format!("chain member {id}")))
    }

    /// Mutable access to a member's data. The interval stays with the chain.
    pub fn member_mut(&mut self, id: MemberId) -> Option<&mut T> {
        self.segments
            .iter_mut()
            .find(|s| s.id == id)
            .map(|s| &mut s.member)
    }

    /// Members of `group`, oldest first.
    pub fn group(&self, group: &T::Group) -> Vec<&Segment<T>> {
        self.segments
            .iter()
            .filter(|s| &s.member.group() == group)
            .collect()
    }

    /// The full ordered timeline the member belongs to.
    pub fn timeline(&self, id: MemberId) -> LeaseResult<Vec<&Segment<T>>> {
        let group = self.segment(id)?.member.group();
        Ok(self.group(&group))
    }

    /// The member immediately before `id` in its group.
    pub fn predecessor(&self, id: MemberId) -> Option<&Segment<T>> {
        let timeline = self.timeline(id).ok()?;
        let pos = timeline.iter().position(|s| s.id == id)?;
        pos.checked_sub(1).map(|p| timeline[p])
    }

    /// The member immediately after `id` in its group.
    pub fn successor(&self, id: MemberId) -> Option<&Segment<T>> {
        let timeline = self.timeline(id).ok()?;
        let pos = timeline.iter().position(|s| s.id == id)?;
        timeline.get(pos + 1).copied()
    }

    /// Ids of every member strictly after `id` in its group, oldest first.
    pub fn later_members(&self, id: MemberId) -> LeaseResult<Vec<MemberId>> {
        let timeline = self.timeline(id)?;
        Ok(timeline
            .iter()
            .skip_while(|s| s.id != id)
            .skip(1)
            .map(|s| s.id)
            .collect())
    }

    pub fn first(&self, group: &T::Group) -> Option<&Segment<T>> {
        self.segments.iter().find(|s| &s.member.group() == group)
    }

    pub fn last(&self, group: &T::Group) -> Option<&Segment<T>> {
        self.segments
            .iter()
            .rev()
            .find(|s| &s.member.group() == group)
    }

    pub fn find_containing(&self, group: &T::Group, date: NaiveDate) -> Option<&Segment<T>> {
        self.segments
            .iter()
            .find(|s| &s.member.group() == group && s.interval.contains(date))
    }

    /// The member active on `date`, otherwise the first one starting later.
    pub fn find_current_or_next(&self, group: &T::Group, date: NaiveDate) -> Option<&Segment<T>> {
        self.find_containing(group, date).or_else(|| {
            self.segments.iter().find(|s| {
                &s.member.group() == group && s.interval.start_date().map_or(false, |d| d > date)
            })
        })
    }

    /// Suggested start for a successor of `id`.
    pub fn default_successor_start(&self, id: MemberId) -> Option<NaiveDate> {
        self.get(id).and_then(|s| s.interval.end_date_excluding())
    }

    /// Suggested end for a predecessor of `id`.
    pub fn default_predecessor_end(&self, id: MemberId) -> Option<NaiveDate> {
        self.get(id)
            .and_then(|s| s.interval.start_date())
            .and_then(|d| d.pred_opt())
    }

    /// Verifies every group: no overlaps, and no gaps for contiguous members.
    pub fn check_integrity(&self) -> LeaseResult<()> {
        let mut groups: Vec<T::Group> = Vec::new();
        for s in &self.segments {
            let g = s.member.group();
            if !groups.contains(&g) {
                groups.push(g);
            }
        }
        for g in &groups {
            let intervals: Vec<(MemberId, DateInterval)> = self
                .group(g)
                .iter()
                .map(|s| (s.id, s.interval))
                .collect();
            check_group::<T>(&intervals)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

impl<T: ChainMember + Clone> IntervalChain<T> {
    /// Adds a member directly. For contiguous chains the member must start
    /// a new group or attach to either end of its group.
    pub fn insert(&mut self, interval: DateInterval, member: T) -> LeaseResult<MemberId> {
        let group = member.group();
        let existing = self.group(&group);
        if let Some(clash) = existing.iter().find(|s| s.interval.overlaps(&interval)) {
            return Err(LeaseError::validation(format!(
                "{interval} overlaps member {} ({})",
                clash.id, clash.interval
            )));
        }
        if T::CONTIGUOUS {
            if let (Some(first), Some(last)) = (existing.first(), existing.last()) {
                let attaches =
                    last.interval.is_contiguous_with(&interval) || interval.is_contiguous_with(&first.interval);
                if !attaches {
                    return Err(LeaseError::validation(format!(
                        "{interval} must attach to the start or end of the chain ({} to {})",
                        fmt_date(first.interval.start_date()),
                        fmt_date(last.interval.end_date())
                    )));
                }
            }
        }
        let id = self.next_id;
        self.commit(
            &group,
            Staged {
                adjustments: Vec::new(),
                insertion: Some(Segment {
                    id,
                    interval,
                    member,
                }),
                removal: None,
            },
        )?;
        info!(member = id, %interval, "chain member inserted");
        Ok(id)
    }

    /// Moves the bounds of `id`. With `adjust_neighbours` the adjacent
    /// members are moved along so the group stays contiguous; without it
    /// the change must fit between them.
    pub fn change_dates(
        &mut self,
        id: MemberId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        adjust_neighbours: bool,
    ) -> LeaseResult<()> {
        let current = self.segment(id)?;
        let group = current.member.group();
        let interval = DateInterval::including(start, end)?;
        let mut adjustments = vec![(id, interval)];

        if let Some(prev) = self.predecessor(id) {
            if adjust_neighbours {
                let s = start.ok_or_else(|| {
                    LeaseError::validation(format!(
                        "a start date is required while member {} precedes member {id}",
                        prev.id
                    ))
                })?;
                let moved = prev
                    .interval
                    .with_end(Some(previous_day(s)?))
                    .map_err(|_| {
                        LeaseError::validation(format!(
                            "starting on {s} would leave no days for member {} ({})",
                            prev.id, prev.interval
                        ))
                    })?;
                adjustments.push((prev.id, moved));
            } else {
                ensure_fits_after::<T>(prev, &interval)?;
            }
        }

        if let Some(next) = self.successor(id) {
            if adjust_neighbours {
                let e = end.ok_or_else(|| {
                    LeaseError::validation(format!(
                        "an end date is required while member {} follows member {id}",
                        next.id
                    ))
                })?;
                let moved = next
                    .interval
                    .with_start(Some(next_day(e)?))
                    .map_err(|_| {
                        LeaseError::validation(format!(
                            "ending on {e} would leave no days for member {} ({})",
                            next.id, next.interval
                        ))
                    })?;
                adjustments.push((next.id, moved));
            } else {
                ensure_fits_before::<T>(&interval, next)?;
            }
        }

        self.commit(&group, Staged::adjust(adjustments))?;
        info!(member = id, %interval, adjust_neighbours, "chain member dates changed");
        Ok(())
    }

    /// Inserts a member right after `id`, created by `factory` for the
    /// interval `[start, end]`.
    ///
    /// An open-ended `id` is closed on the day before `start`. A closed
    /// `id` must end on the day before `start`; shortening it instead
    /// requires `confirm`.
    pub fn succeeded_by<F: MemberFactory<T>>(
        &mut self,
        id: MemberId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        confirm: bool,
        factory: F,
    ) -> LeaseResult<MemberId> {
        let current = self.segment(id)?;
        let current_interval = current.interval;
        let group = current.member.group();

        let start =
            start.ok_or_else(|| LeaseError::validation("a successor needs a start date"))?;
        let interval = DateInterval::including(Some(start), end)?;

        if let Some(cur_start) = current_interval.start_date() {
            if start <= cur_start {
                return Err(LeaseError::validation(format!(
                    "successor must start after {cur_start}"
                )));
            }
        }

        let closed = match current_interval.end_date() {
            None => Some(current_interval.with_end(Some(previous_day(start)?))?),
            Some(cur_end) => {
                let expected = next_day(cur_end)?;
                if start == expected {
                    None
                } else if start < expected {
                    if !confirm {
                        return Err(LeaseError::validation(format!(
                            "a successor starting {start} shortens member {id} which ends {cur_end}; confirm to proceed"
                        )));
                    }
                    Some(current_interval.with_end(Some(previous_day(start)?))?)
                } else if T::CONTIGUOUS {
                    return Err(LeaseError::validation(format!(
                        "successor must start on {expected} to keep the chain contiguous"
                    )));
                } else {
                    None
                }
            }
        };

        if let Some(next) = self.successor(id) {
            ensure_fits_before::<T>(&interval, next)?;
        }

        let new_id = self.next_id;
        let member = factory.new_member(&interval);
        if member.group() != group {
            return Err(LeaseError::invariant(format!(
                "successor of member {id} was built for another group"
            )));
        }
        let mut staged = Staged::adjust(closed.map(|c| vec![(id, c)]).unwrap_or_default());
        staged.insertion = Some(Segment {
            id: new_id,
            interval,
            member,
        });
        self.commit(&group, staged)?;
        info!(member = id, successor = new_id, %interval, "chain member succeeded");
        Ok(new_id)
    }

    /// Inserts a member right before `id`, created by `factory` for the
    /// interval `[start, end]`. `end` must be the day before `id` starts;
    /// moving the start of `id` later requires `confirm`.
    pub fn preceded_by<F: MemberFactory<T>>(
        &mut self,
        id: MemberId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        confirm: bool,
        factory: F,
    ) -> LeaseResult<MemberId> {
        let current = self.segment(id)?;
        let current_interval = current.interval;
        let group = current.member.group();

        let end = end.ok_or_else(|| LeaseError::validation("a predecessor needs an end date"))?;
        let interval = DateInterval::including(start, Some(end))?;

        if let Some(cur_end) = current_interval.end_date() {
            if end >= cur_end {
                return Err(LeaseError::validation(format!(
                    "predecessor must end before {cur_end}"
                )));
            }
        }

        let shifted = match current_interval.start_date() {
            None => {
                if !confirm {
                    return Err(LeaseError::validation(format!(
                        "member {id} has no start date; confirm to start it on the day after {end}"
                    )));
                }
                Some(current_interval.with_start(Some(next_day(end)?))?)
            }
            Some(cur_start) => {
                let expected = previous_day(cur_start)?;
                if end == expected {
                    None
                } else if end > expected {
                    if !confirm {
                        return Err(LeaseError::validation(format!(
                            "a predecessor ending {end} shortens member {id} which starts {cur_start}; confirm to proceed"
                        )));
                    }
                    Some(current_interval.with_start(Some(next_day(end)?))?)
                } else if T::CONTIGUOUS {
                    return Err(LeaseError::validation(format!(
                        "predecessor must end on {expected} to keep the chain contiguous"
                    )));
                } else {
                    None
                }
            }
        };

        if let Some(prev) = self.predecessor(id) {
            ensure_fits_after::<T>(prev, &interval)?;
        }

        let new_id = self.next_id;
        let member = factory.new_member(&interval);
        if member.group() != group {
            return Err(LeaseError::invariant(format!(
                "predecessor of member {id} was built for another group"
            )));
        }
        let mut staged = Staged::adjust(shifted.map(|c| vec![(id, c)]).unwrap_or_default());
        staged.insertion = Some(Segment {
            id: new_id,
            interval,
            member,
        });
        self.commit(&group, staged)?;
        info!(member = id, predecessor = new_id, %interval, "chain member preceded");
        Ok(new_id)
    }

    /// Removes `id`, which must be the most recent member of its group.
    pub fn detach_last(&mut self, id: MemberId) -> LeaseResult<Segment<T>> {
        let group = self.segment(id)?.member.group();
        if let Some(next) = self.successor(id) {
            return Err(LeaseError::validation(format!(
                "member {id} is followed by member {}; remove later members first",
                next.id
            )));
        }
        self.commit(
            &group,
            Staged {
                adjustments: Vec::new(),
                insertion: None,
                removal: Some(id),
            },
        )?;
        let pos = self
            .segments
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| LeaseError::NotFound(format!("chain member {id}")))?;
        info!(member = id, "chain member detached");
        Ok(self.segments.remove(pos))
    }

    /// Applies staged boundaries after checking the resulting group.
    fn commit(&mut self, group: &T::Group, staged: Staged<T>) -> LeaseResult<()> {
        let mut prospective: Vec<(MemberId, DateInterval)> = self
            .group(group)
            .iter()
            .filter(|s| Some(s.id) != staged.removal)
            .map(|s| {
                let interval = staged
                    .adjustments
                    .iter()
                    .find(|(id, _)| *id == s.id)
                    .map(|(_, i)| *i)
                    .unwrap_or(s.interval);
                (s.id, interval)
            })
            .collect();
        if let Some(ins) = &staged.insertion {
            prospective.push((ins.id, ins.interval));
        }
        prospective.sort_by_key(|(id, i)| (i.start_date(), *id));
        check_group::<T>(&prospective)?;

        let next_id = match &staged.insertion {
            Some(ins) => self.next_id.max(id_after(ins.id)?),
            None => self.next_id,
        };
        for (id, interval) in staged.adjustments {
            if let Some(s) = self.segments.iter_mut().find(|s| s.id == id) {
                s.interval = interval;
            }
        }
        if let Some(ins) = staged.insertion {
            self.segments.push(ins);
        }
        self.next_id = next_id;
        self.segments.sort_by_key(|s| s.sort_key());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn id_after(id: MemberId) -> LeaseResult<MemberId> {
    id.checked_add(1)
        .ok_or_else(|| LeaseError::invariant(format!("member id {id} exhausts the id space")))
}

/// `intervals` must be sorted by start date.
fn check_group<T: ChainMember>(intervals: &[(MemberId, DateInterval)]) -> LeaseResult<()> {
    for pair in intervals.windows(2) {
        let (a_id, a) = pair[0];
        let (b_id, b) = pair[1];
        if a.overlaps(&b) {
            return Err(LeaseError::invariant(format!(
                "member {a_id} ({a}) overlaps member {b_id} ({b})"
            )));
        }
        if T::CONTIGUOUS && !a.is_contiguous_with(&b) {
            return Err(LeaseError::invariant(format!(
                "gap between member {a_id} ({a}) and member {b_id} ({b})"
            )));
        }
    }
    Ok(())
}

fn ensure_fits_after<T: ChainMember>(prev: &Segment<T>, interval: &DateInterval) -> LeaseResult<()> {
    if prev.interval.overlaps(interval) {
        return Err(LeaseError::validation(format!(
            "{interval} overlaps member {} ({})",
            prev.id, prev.interval
        )));
    }
    if T::CONTIGUOUS && !prev.interval.is_contiguous_with(interval) {
        return Err(LeaseError::validation(format!(
            "start must be {} to follow member {} contiguously",
            fmt_date(prev.interval.end_date_excluding()),
            prev.id
        )));
    }
    Ok(())
}

fn ensure_fits_before<T: ChainMember>(interval: &DateInterval, next: &Segment<T>) -> LeaseResult<()> {
    if interval.is_open_ended() {
        return Err(LeaseError::validation(format!(
            "an end date is required because member {} follows from {}",
            next.id,
            fmt_date(next.interval.start_date())
        )));
    }
    if interval.overlaps(&next.interval) {
        return Err(LeaseError::validation(format!(
            "{interval} overlaps member {} ({})",
            next.id, next.interval
        )));
    }
    if T::CONTIGUOUS && !interval.is_contiguous_with(&next.interval) {
        return Err(LeaseError::validation(format!(
            "end must be the day before {} so member {} still follows contiguously",
            fmt_date(next.interval.start_date()),
            next.id
        )));
    }
    Ok(())
}

fn fmt_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.to_string()).unwrap_or_else(|| "unbounded".into())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
