//! Explicit listing options for hosts and groups, plus the shared paging
//! logic. Every optional field has a documented default.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::FleetError;
use crate::models::{Host, HostGroup, HostGroupView, HostStatus};

pub const DEFAULT_PER_PAGE: usize = 20;
pub const MAX_PER_PAGE: usize = 49;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostSort {
    HostName,
    HostGroupName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupSort {
    HostCount,
    HostGroupName,
}

/// Host listing options.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HostQuery {
    /// Group names to keep; empty keeps every group.
    pub host_group_list: Vec<String>,
    pub management: Option<bool>,
    /// Statuses to keep; `None` keeps every status.
    pub status: Option<Vec<HostStatus>>,
    pub sort: Option<HostSort>,
    pub direction: Direction,
    /// 1-based page. Without a page everything is returned.
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

/// Group listing options.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GroupQuery {
    pub sort: Option<GroupSort>,
    pub direction: Direction,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub total_count: usize,
    pub total_page: usize,
    #[serde(flatten)]
    pub items: T,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostItems {
    pub host_infos: Vec<Host>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupItems {
    pub host_group_infos: Vec<HostGroupView>,
}

fn check_paging(page: Option<usize>, per_page: Option<usize>) -> Result<(), FleetError> {
    if page == Some(0) {
        return Err(FleetError::Param("page starts at 1".into()));
    }
    if let Some(per_page) = per_page {
        if per_page == 0 || per_page > MAX_PER_PAGE {
            return Err(FleetError::Param(format!("per_page must be within 1..={}", MAX_PER_PAGE)));
        }
    }
    Ok(())
}

/// Slices `items` to the requested page and reports the page count.
fn paginate<T>(items: Vec<T>, page: Option<usize>, per_page: Option<usize>) -> (usize, usize, Vec<T>) {
    let total = items.len();
    let Some(page) = page else {
        let pages = usize::from(total > 0);
        return (total, pages, items);
    };
    let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE);
    let pages = total.div_ceil(per_page);
    // pages past the end come back empty
    let offset = (page - 1).saturating_mul(per_page);
    let slice = items.into_iter().skip(offset).take(per_page).collect();
    (total, pages, slice)
}

fn directed(ordering: Ordering, direction: Direction) -> Ordering {
    match direction {
        Direction::Asc => ordering,
        Direction::Desc => ordering.reverse(),
    }
}

impl HostQuery {
    pub fn matches(&self, host: &Host) -> bool {
        (self.host_group_list.is_empty() || self.host_group_list.contains(&host.host_group_name))
            && self.management.map_or(true, |m| m == host.management)
            && self.status.as_ref().map_or(true, |s| s.contains(&host.status))
    }

    /// Filters, sorts and pages `hosts`. Keys never leave through a listing.
    pub fn apply(&self, hosts: Vec<Host>) -> Result<Page<HostItems>, FleetError> {
        check_paging(self.page, self.per_page)?;

        let mut hosts: Vec<Host> = hosts
            .into_iter()
            .filter(|h| self.matches(h))
            .map(|h| h.without_pkey())
            .collect();

        match self.sort {
            Some(HostSort::HostName) => {
                hosts.sort_by(|a, b| directed(a.host_name.cmp(&b.host_name), self.direction))
            }
            Some(HostSort::HostGroupName) => hosts.sort_by(|a, b| {
                directed(a.host_group_name.cmp(&b.host_group_name), self.direction)
                    .then_with(|| a.host_id.cmp(&b.host_id))
            }),
            None => hosts.sort_by_key(|h| h.host_id),
        }

        let (total_count, total_page, host_infos) = paginate(hosts, self.page, self.per_page);
        Ok(Page { total_count, total_page, items: HostItems { host_infos } })
    }
}

impl GroupQuery {
    /// Builds the group views with `host_count` derived from `hosts`.
    pub fn apply(&self, groups: Vec<HostGroup>, hosts: &[Host]) -> Result<Page<GroupItems>, FleetError> {
        check_paging(self.page, self.per_page)?;

        let mut views: Vec<HostGroupView> = groups
            .into_iter()
            .map(|g| HostGroupView {
                host_count: hosts.iter().filter(|h| h.host_group_id == g.host_group_id).count(),
                host_group_id: g.host_group_id,
                host_group_name: g.host_group_name,
                description: g.description,
            })
            .collect();

        match self.sort {
            Some(GroupSort::HostCount) => views.sort_by(|a, b| {
                directed(a.host_count.cmp(&b.host_count), self.direction)
                    .then_with(|| a.host_group_name.cmp(&b.host_group_name))
            }),
            Some(GroupSort::HostGroupName) => views.sort_by(|a, b| {
                directed(a.host_group_name.cmp(&b.host_group_name), self.direction)
            }),
            None => views.sort_by_key(|g| g.host_group_id),
        }

        let (total_count, total_page, host_group_infos) = paginate(views, self.page, self.per_page);
        Ok(Page { total_count, total_page, items: GroupItems { host_group_infos } })
    }
}
