//! Built-in service specs: todoist, gcal, gmail, deep_pcb.
//!
//! Each spec carries the capability set and payload schema shared by the
//! live and mock variants of that service.

use crate::capability::CapabilitySet;
use crate::schema::{OperationSchema, ServiceSchema, ServiceSpec};
use tripwire_core::Action;

/// Todoist task manager
#[must_use]
pub fn todoist() -> ServiceSpec {
    spec(
        "todoist",
        "Task and project management",
        &[
            keys("task", &["content"], &["description", "due_date", "priority", "project_id", "labels"]),
            keys("project", &["name"], &["color", "parent_id"]),
            keys("label", &["name"], &["color"]),
            keys("comment", &["task_id", "content"], &[]),
        ],
    )
}

/// Google Calendar
#[must_use]
pub fn gcal() -> ServiceSpec {
    spec(
        "gcal",
        "Calendar events and reminders",
        &[
            keys("event", &["summary", "start", "end"], &["description", "location", "attendees", "calendar_id"]),
            keys("calendar", &["summary"], &["time_zone", "description"]),
            keys("reminder", &["event_id", "minutes"], &["method"]),
        ],
    )
}

/// Gmail
#[must_use]
pub fn gmail() -> ServiceSpec {
    spec(
        "gmail",
        "Email messages, labels and attachments",
        &[
            keys("email", &["to", "subject", "body"], &["cc", "bcc", "html"]),
            keys("label", &["name"], &["color"]),
            keys("attachment", &["message_id", "filename"], &["mime_type"]),
        ],
    )
}

/// DeepPCB board design
#[must_use]
pub fn deep_pcb() -> ServiceSpec {
    spec(
        "deep_pcb",
        "PCB designs, components and layouts",
        &[
            keys("pcb_design", &["name"], &["layers", "width_mm", "height_mm"]),
            keys("component", &["name", "package"], &["value", "manufacturer"]),
            keys("footprint", &["name"], &["pads", "package"]),
            keys("schematic", &["name"], &["sheets"]),
            keys("layout", &["design_id"], &["constraints"]),
        ],
    )
}

/// Every built-in spec in registration order
#[must_use]
pub fn all() -> Vec<ServiceSpec> {
    vec![todoist(), gcal(), gmail(), deep_pcb()]
}

/// Item type with its required and optional create keys
struct ItemKeys {
    item_type: &'static str,
    required: &'static [&'static str],
    optional: &'static [&'static str],
}

const fn keys(
    item_type: &'static str,
    required: &'static [&'static str],
    optional: &'static [&'static str],
) -> ItemKeys {
    ItemKeys {
        item_type,
        required,
        optional,
    }
}

/// All six actions over the given item types with conventional keys:
/// `create` uses the item's keys, `read`/`delete` need `id`, `update`
/// needs `id` with optional `updates`, `list` takes `limit`, and
/// `search` needs `query` with optional `max_results`.
fn spec(name: &str, description: &str, items: &[ItemKeys]) -> ServiceSpec {
    let capabilities = CapabilitySet::all_actions().with_item_types(items.iter().map(|k| k.item_type));

    let mut schema = ServiceSchema::new(name).with_description(description);
    for keys in items {
        let item = Some(keys.item_type);
        schema = schema
            .with_operation(
                OperationSchema::new(Action::Create, item)
                    .required(keys.required)
                    .optional(keys.optional),
            )
            .with_operation(OperationSchema::new(Action::Read, item).required(&["id"]))
            .with_operation(
                OperationSchema::new(Action::Update, item)
                    .required(&["id"])
                    .optional(&["updates"]),
            )
            .with_operation(OperationSchema::new(Action::Delete, item).required(&["id"]))
            .with_operation(OperationSchema::new(Action::List, item).optional(&["limit"]))
            .with_operation(
                OperationSchema::new(Action::Search, item)
                    .required(&["query"])
                    .optional(&["max_results"]),
            );
    }

    ServiceSpec::new(name, capabilities).with_schema(schema)
}
