use crate::imports::*;
use rand::Rng;
use std::cmp::Ordering;

/*
    Types:
    * GroupMode - The modifiers and branch assignment in front of a pipeline step
    * Modifier - One slicing operation, applied left to right
    * Assign - How active groups are routed to the step's branches
    * Plan - The groups a GroupMode produced, and how to put their outputs back together
    * Group - A list of items and where it goes
    * Route - Pass through untouched, one branch, or every branch
*/

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupMode {
    pub modifiers: Vec<Modifier>,
    pub assign: Assign,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Modifier {
    /// `(n)` consecutive chunks of n.
    Split(usize),
    /// `/n` round-robin into n groups, `/n!` errors on an uneven count.
    Spread { n: usize, strict: bool },
    /// `%n` every n-th item as one group, the rest pass through.
    Interval(usize),
    /// `#range` selected positions as one group, the rest pass through.
    /// `^` and `$` are `#1` and `#-1`.
    Column { range: ColumnRange, strict: bool },
    /// `\n` groups of at most n, each taking every k-th item where k is the group count.
    /// `\n!` errors unless the items fill every group.
    Stride { n: usize, strict: bool },
    /// `IF(c)` groups failing the condition pass through, `IF(c)!` drops them.
    If { condition: Condition, strict: bool },
    SortBy(Vec<SortKey>),
    GroupBy { kind: BucketKind, keys: Vec<usize> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRange {
    At(i64),
    Slice(Option<i64>, Option<i64>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub index: usize,
    pub descending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketKind {
    Group,
    Collect,
    Extract,
}

impl BucketKind {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_lowercase().as_str() {
            "group" => Some(BucketKind::Group),
            "collect" => Some(BucketKind::Collect),
            "extract" => Some(BucketKind::Extract),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Assign {
    /// Round-robin over the branches.
    #[default]
    Default,
    /// `*` every group goes to every branch.
    Multiply,
    /// `?` a random branch per group.
    Random,
    /// `SWITCH(c1 | c2 | ...)` the branch of the first true condition.
    Switch(Vec<Condition>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Pass,
    Branch(usize),
    Every,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Selected,
    Gap,
}

/// Marks a group as part of an interval selection, so outputs can be re-slotted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Weave {
    id: usize,
    role: Role,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub items: Vec<String>,
    pub route: Route,
    weave: Vec<Weave>,
}

impl Group {
    fn active(items: Vec<String>, weave: Vec<Weave>) -> Self {
        Group {
            items,
            route: Route::Branch(0),
            weave,
        }
    }

    fn pass(items: Vec<String>, weave: Vec<Weave>) -> Self {
        Group {
            items,
            route: Route::Pass,
            weave,
        }
    }

    pub fn is_active(&self) -> bool {
        self.route != Route::Pass
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    groups: Vec<Group>,
    /// Number of selected items per interval weave.
    slots: Vec<usize>,
}

impl GroupMode {
    pub fn parse(source: &str) -> std::result::Result<(GroupMode, usize), ErrorLog> {
        crate::grammar::parse_groupmode(source)
    }

    /// No modifiers and plain round-robin: the step sees the items as they are.
    pub fn is_trivial(&self) -> bool {
        self.modifiers.is_empty() && self.assign == Assign::Default
    }

    /// Every condition in the mode, for static analysis.
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut conditions: Vec<&Condition> = self
            .modifiers
            .iter()
            .filter_map(|m| match m {
                Modifier::If { condition, .. } => Some(condition),
                _ => None,
            })
            .collect();
        if let Assign::Switch(cases) = &self.assign {
            conditions.extend(cases.iter());
        }
        conditions
    }

    /// Checks the branch count against the assignment.
    pub fn check_branches(&self, branches: usize) -> std::result::Result<(), String> {
        if let Assign::Switch(cases) = &self.assign
            && branches != cases.len()
            && branches != cases.len() + 1
        {
            return Err(format!(
                "SWITCH with {} conditions needs {} or {} branches, got {branches}",
                cases.len(),
                cases.len(),
                cases.len() + 1
            ));
        }
        Ok(())
    }

    /// Slices the items into routed groups.
    pub async fn plan(
        &self,
        items: Vec<String>,
        branches: usize,
        context: &Context,
        scope: &ItemScope<'_>,
    ) -> Diagnosed<Plan> {
        let mut errors = ErrorLog::new();
        let mut plan = Plan::new(items);

        for modifier in &self.modifiers {
            let result = match modifier {
                Modifier::Split(n) => {
                    plan.refine(|items, weave| {
                        Ok(items
                            .chunks(*n)
                            .map(|chunk| Group::active(chunk.to_vec(), weave.to_vec()))
                            .collect())
                    })
                }
                Modifier::Spread { n, strict } => plan.refine(|items, weave| spread(items, weave, *n, *strict)),
                Modifier::Interval(n) => {
                    plan.interval(*n);
                    Ok(())
                }
                Modifier::Column { range, strict } => {
                    plan.refine(|items, weave| column(items, weave, *range, *strict))
                }
                Modifier::Stride { n, strict } => {
                    plan.refine(|items, weave| stride(items, weave, *n, *strict))
                }
                Modifier::If { condition, strict } => {
                    errors.merge(plan.filter(condition, *strict, context, scope).await, Some("IF"))?;
                    Ok(())
                }
                Modifier::SortBy(keys) => plan.sort(keys),
                Modifier::GroupBy { kind, keys } => plan.bucket(*kind, keys),
            };
            if let Err(message) = result {
                return Err(errors.fail(message));
            }
        }

        match &self.assign {
            Assign::Default => {
                for (i, group) in plan.active_mut().enumerate() {
                    group.route = Route::Branch(i % branches.max(1));
                }
            }
            Assign::Multiply => {
                for group in plan.active_mut() {
                    group.route = Route::Every;
                }
            }
            Assign::Random => {
                let mut rng = rand::rng();
                for group in plan.active_mut() {
                    group.route = Route::Branch(rng.random_range(0..branches.max(1)));
                }
            }
            Assign::Switch(cases) => {
                errors.merge(plan.switch(cases, branches, context, scope).await, Some("SWITCH"))?;
            }
        }

        tracing::debug!(
            groups = plan.groups.len(),
            active = plan.groups.iter().filter(|g| g.is_active()).count(),
            "Planned group mode"
        );
        errors.into_result(plan)
    }
}

fn spread(
    items: Vec<String>,
    weave: &[Weave],
    n: usize,
    strict: bool,
) -> std::result::Result<Vec<Group>, String> {
    if strict && items.len() % n != 0 {
        return Err(format!(
            "Cannot spread {} items evenly over {n} groups",
            items.len()
        ));
    }
    let mut buckets = vec![Vec::new(); n];
    for (i, item) in items.into_iter().enumerate() {
        buckets[i % n].push(item);
    }
    Ok(buckets
        .into_iter()
        .map(|bucket| Group::active(bucket, weave.to_vec()))
        .collect())
}

fn stride(
    items: Vec<String>,
    weave: &[Weave],
    n: usize,
    strict: bool,
) -> std::result::Result<Vec<Group>, String> {
    if strict && items.len() % n != 0 {
        return Err(format!(
            "Cannot fill columns of {n} exactly with {} items",
            items.len()
        ));
    }
    let count = items.len().div_ceil(n);
    spread(items, weave, count, false)
}

/// Converts a 1-based (or negative, from the end) position to an index, `None` when out of range.
fn position(p: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let index = match p {
        0 => return None,
        p if p > 0 => p - 1,
        p => len + p,
    };
    (0..=len).contains(&index).then_some(index as usize)
}

fn clamp_position(p: i64, len: usize) -> usize {
    let len = len as i64;
    let index = if p > 0 { p - 1 } else if p < 0 { len + p } else { 0 };
    index.clamp(0, len) as usize
}

fn column(
    items: Vec<String>,
    weave: &[Weave],
    range: ColumnRange,
    strict: bool,
) -> std::result::Result<Vec<Group>, String> {
    let len = items.len();
    let resolve = |p: i64| -> std::result::Result<usize, String> {
        if strict {
            position(p, len).ok_or_else(|| format!("Column position {p} is out of range for {len} items"))
        } else {
            Ok(clamp_position(p, len))
        }
    };

    let (start, end) = match range {
        ColumnRange::At(p) => {
            let start = resolve(p)?;
            if strict && start >= len {
                return Err(format!("Column position {p} is out of range for {len} items"));
            }
            (start, (start + 1).min(len))
        }
        ColumnRange::Slice(start, end) => (
            start.map(resolve).transpose()?.unwrap_or(0),
            end.map(resolve).transpose()?.unwrap_or(len),
        ),
    };
    let end = end.max(start);

    let mut groups = Vec::with_capacity(3);
    if start > 0 {
        groups.push(Group::pass(items[..start].to_vec(), weave.to_vec()));
    }
    if end > start {
        groups.push(Group::active(items[start..end].to_vec(), weave.to_vec()));
    }
    if end < len {
        groups.push(Group::pass(items[end..].to_vec(), weave.to_vec()));
    }
    Ok(groups)
}

fn compare_keys(a: &[&str], b: &[&str], keys: &[SortKey]) -> Ordering {
    for ((x, y), key) in a.iter().zip(b.iter()).zip(keys) {
        let ordering = match (x.trim().parse::<f64>(), y.trim().parse::<f64>()) {
            (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => x.cmp(y),
        };
        let ordering = if key.descending { ordering.reverse() } else { ordering };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn key_values<'g>(group: &'g Group, keys: impl Iterator<Item = usize>) -> std::result::Result<Vec<&'g str>, String> {
    keys.map(|k| {
        group.items.get(k).map(String::as_str).ok_or_else(|| {
            format!(
                "Key index {k} is out of range for a group of {} items",
                group.items.len()
            )
        })
    })
    .collect()
}

impl Plan {
    fn new(items: Vec<String>) -> Self {
        let groups = if items.is_empty() {
            Vec::new()
        } else {
            vec![Group::active(items, Vec::new())]
        };
        Plan {
            groups,
            slots: Vec::new(),
        }
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    fn active_mut(&mut self) -> impl Iterator<Item = &mut Group> {
        self.groups.iter_mut().filter(|g| g.is_active())
    }

    /// Replaces every active group with the groups `f` makes of it.
    fn refine(
        &mut self,
        mut f: impl FnMut(Vec<String>, &[Weave]) -> std::result::Result<Vec<Group>, String>,
    ) -> std::result::Result<(), String> {
        let mut refined = Vec::with_capacity(self.groups.len());
        for group in std::mem::take(&mut self.groups) {
            if group.is_active() {
                refined.extend(f(group.items, &group.weave)?);
            } else {
                refined.push(group);
            }
        }
        self.groups = refined;
        Ok(())
    }

    fn interval(&mut self, n: usize) {
        let mut refined = Vec::with_capacity(self.groups.len());
        for group in std::mem::take(&mut self.groups) {
            if !group.is_active() {
                refined.push(group);
                continue;
            }
            let id = self.slots.len();
            let tag = |role| {
                let mut weave = group.weave.clone();
                weave.push(Weave { id, role });
                weave
            };

            let mut selected = Vec::new();
            let mut gaps: Vec<Vec<String>> = Vec::new();
            for (i, item) in group.items.iter().enumerate() {
                if i % n == 0 {
                    selected.push(item.clone());
                    gaps.push(Vec::new());
                } else if let Some(gap) = gaps.last_mut() {
                    gap.push(item.clone());
                }
            }
            self.slots.push(selected.len());
            refined.push(Group::active(selected, tag(Role::Selected)));
            for gap in gaps.into_iter().filter(|g| !g.is_empty()) {
                refined.push(Group::pass(gap, tag(Role::Gap)));
            }
        }
        self.groups = refined;
    }

    async fn filter(
        &mut self,
        condition: &Condition,
        strict: bool,
        context: &Context,
        scope: &ItemScope<'_>,
    ) -> Diagnosed<()> {
        let mut errors = ErrorLog::new();
        let mut kept = Vec::with_capacity(self.groups.len());
        for mut group in std::mem::take(&mut self.groups) {
            if group.is_active() {
                let group_scope = scope.child(group.items.clone());
                let passed = errors.merge(condition.evaluate(context, &group_scope).await, None)?;
                if !passed {
                    if strict {
                        continue;
                    }
                    group.route = Route::Pass;
                }
            }
            kept.push(group);
        }
        self.groups = kept;
        errors.into_result(())
    }

    fn clear_weaves(&mut self) {
        self.slots.clear();
        for group in &mut self.groups {
            group.weave.clear();
        }
    }

    fn sort(&mut self, keys: &[SortKey]) -> std::result::Result<(), String> {
        let positions: Vec<usize> = (0..self.groups.len()).filter(|&i| self.groups[i].is_active()).collect();
        let mut active = Vec::with_capacity(positions.len());
        for &i in &positions {
            let values = key_values(&self.groups[i], keys.iter().map(|k| k.index))?;
            active.push((values, i));
        }
        active.sort_by(|(a, _), (b, _)| compare_keys(a, b, keys));

        let order: Vec<usize> = active.into_iter().map(|(_, i)| i).collect();
        let mut reordered = self.groups.clone();
        for (slot, source) in positions.iter().zip(order) {
            reordered[*slot] = self.groups[source].clone();
        }
        self.groups = reordered;
        self.clear_weaves();
        Ok(())
    }

    fn bucket(&mut self, kind: BucketKind, keys: &[usize]) -> std::result::Result<(), String> {
        let mut index: HashMap<Vec<String>, usize> = HashMap::new();
        let mut buckets: Vec<(Vec<String>, Vec<Vec<String>>)> = Vec::new();
        // position of each output: a pass-through group or a bucket
        let mut layout: Vec<std::result::Result<Group, usize>> = Vec::new();

        for group in std::mem::take(&mut self.groups) {
            if !group.is_active() {
                layout.push(Ok(group));
                continue;
            }
            let key: Vec<String> = key_values(&group, keys.iter().copied())?
                .into_iter()
                .map(str::to_string)
                .collect();
            match index.get(&key) {
                Some(&b) => buckets[b].1.push(group.items),
                None => {
                    index.insert(key.clone(), buckets.len());
                    layout.push(Err(buckets.len()));
                    buckets.push((key, vec![group.items]));
                }
            }
        }

        let mut buckets: Vec<Option<(Vec<String>, Vec<Vec<String>>)>> = buckets.into_iter().map(Some).collect();
        for entry in layout {
            match entry {
                Ok(group) => self.groups.push(group),
                Err(b) => {
                    let Some((key, members)) = buckets[b].take() else { continue };
                    self.groups.push(match kind {
                        BucketKind::Group => Group::active(members.concat(), Vec::new()),
                        BucketKind::Collect => {
                            let mut items = key;
                            for member in members {
                                items.extend(
                                    member
                                        .into_iter()
                                        .enumerate()
                                        .filter(|(i, _)| !keys.contains(i))
                                        .map(|(_, item)| item),
                                );
                            }
                            Group::active(items, Vec::new())
                        }
                        BucketKind::Extract => Group::pass(key, Vec::new()),
                    });
                }
            }
        }
        self.clear_weaves();
        Ok(())
    }

    async fn switch(
        &mut self,
        cases: &[Condition],
        branches: usize,
        context: &Context,
        scope: &ItemScope<'_>,
    ) -> Diagnosed<()> {
        let mut errors = ErrorLog::new();
        for group in self.groups.iter_mut().filter(|g| g.is_active()) {
            let group_scope = scope.child(group.items.clone());
            let mut route = if branches > cases.len() {
                Route::Branch(cases.len())
            } else {
                Route::Pass
            };
            for (i, case) in cases.iter().enumerate() {
                if errors.merge(case.evaluate(context, &group_scope).await, None)? {
                    route = Route::Branch(i);
                    break;
                }
            }
            group.route = route;
        }
        errors.into_result(())
    }

    /// Reassembles one output list per group into the step's output.
    pub fn assemble(&self, outputs: Vec<Vec<String>>) -> Vec<String> {
        let entries: Vec<(&[Weave], Vec<String>)> = self
            .groups
            .iter()
            .map(|g| g.weave.as_slice())
            .zip(outputs)
            .collect();
        weave_level(entries, 0, &self.slots)
    }
}

/// Splices interval outputs back between their gaps, one nesting level at a time.
fn weave_level(entries: Vec<(&[Weave], Vec<String>)>, depth: usize, slots: &[usize]) -> Vec<String> {
    let mut out = Vec::new();
    let mut entries = entries.into_iter().peekable();

    while let Some((tags, items)) = entries.next() {
        let Some(tag) = tags.get(depth).copied() else {
            out.extend(items);
            continue;
        };
        let mut run = vec![(tags, items)];
        while let Some(next) = entries.next_if(|(t, _)| t.get(depth).map(|w| w.id) == Some(tag.id)) {
            run.push(next);
        }

        let (selected, gaps): (Vec<_>, Vec<_>) = run
            .into_iter()
            .partition(|(t, _)| t.get(depth).is_some_and(|w| w.role == Role::Selected));
        let selected = weave_level(selected, depth + 1, slots);
        let mut gaps = gaps.into_iter().map(|(_, items)| items);

        if slots.get(tag.id) == Some(&selected.len()) {
            for item in selected {
                out.push(item);
                if let Some(gap) = gaps.next() {
                    out.extend(gap);
                }
            }
        } else {
            out.extend(selected);
        }
        out.extend(gaps.flatten());
    }
    out
}
