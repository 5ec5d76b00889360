//! Handlers compiled into every build.
//!
//! The first six are core and always load, in this order. `example` is
//! optional and loads only through a `plugin.toml` naming it.

pub mod auto_retract;
pub mod example;
pub mod group_list;
pub mod group_member_list;
pub mod menu;
pub mod online_monitor;
pub mod switch_query;

use std::sync::Arc;

use crate::{handler::Handler, registry::Catalog};

pub use {
    auto_retract::AutoRetract, example::Example, group_list::GroupList,
    group_member_list::GroupMemberList, menu::Menu, online_monitor::OnlineMonitor,
    switch_query::SwitchQuery,
};

/// Catalog with every bundled entrypoint.
pub fn catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog
        .register(online_monitor::NAME, true, |_| {
            Ok(Arc::new(OnlineMonitor::new()) as Arc<dyn Handler>)
        })
        .register(auto_retract::NAME, true, |_| {
            Ok(Arc::new(AutoRetract) as Arc<dyn Handler>)
        })
        .register(menu::NAME, true, |_| Ok(Arc::new(Menu) as Arc<dyn Handler>))
        .register(switch_query::NAME, true, |_| {
            Ok(Arc::new(SwitchQuery) as Arc<dyn Handler>)
        })
        .register(group_list::NAME, true, |ctx| {
            Ok(Arc::new(GroupList::new(&ctx.data_dir)) as Arc<dyn Handler>)
        })
        .register(group_member_list::NAME, true, |ctx| {
            Ok(Arc::new(GroupMemberList::new(&ctx.data_dir)) as Arc<dyn Handler>)
        })
        .register(example::NAME, false, |_| {
            Ok(Arc::new(Example) as Arc<dyn Handler>)
        });
    catalog
}
