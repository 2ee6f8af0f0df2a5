use leptos::prelude::*;

use turfmap_shared::colors::{resolve_color, rgba_css};
use turfmap_shared::{
    BOX_SIZE_CHOICES, BoxSize, EditorError, GangFilter, PaintMode, RemovalPolicy, TerritoryEditor,
    TerritoryField,
};

use crate::app::{
    Editor, Loading, Toast, ToastKind, Toasts, copy_static_data, save_selected, show_toast,
};

const PANEL_STYLE: &str = "position: absolute; top: 16px; right: 16px; z-index: 30; width: 300px; max-height: calc(100% - 32px); overflow-y: auto; background: #13161f; border: 1px solid #282c3e; border-radius: 8px; padding: 12px; color: #e2e0d8; font-family: 'Inter', system-ui, sans-serif; font-size: 0.8rem; box-shadow: 0 4px 16px rgba(0,0,0,0.5);";
const INPUT_STYLE: &str = "width: 100%; box-sizing: border-box; padding: 4px 6px; background: #0c0e17; color: #e2e0d8; border: 1px solid #282c3e; border-radius: 4px; font-size: 0.78rem;";
const LABEL_STYLE: &str = "display: block; margin: 6px 0 2px; color: #9a9590; font-size: 0.72rem;";

fn button_style(background: &str) -> String {
    format!(
        "width: 100%; padding: 5px; margin-top: 6px; background: {background}; color: #fff; border: none; border-radius: 4px; cursor: pointer; font-size: 0.78rem;"
    )
}

fn tool_style(active: bool, accent: &str) -> String {
    let background = if active { accent } else { "#1a1d2a" };
    format!(
        "padding: 4px; background: {background}; color: #e2e0d8; border: 1px solid #282c3e; border-radius: 4px; cursor: pointer; font-size: 0.78rem;"
    )
}

/// Run an editor action and report a refusal as a toast.
fn run(
    editor: RwSignal<TerritoryEditor>,
    toasts: RwSignal<Option<Toast>>,
    action: impl FnOnce(&mut TerritoryEditor) -> Result<(), EditorError>,
) {
    if let Some(Err(e)) = editor.try_update(action) {
        show_toast(toasts, ToastKind::Error, e.to_string());
    }
}

#[derive(Debug, Clone, PartialEq)]
struct TerritoryRow {
    id: String,
    name: String,
    gang: String,
    color: (u8, u8, u8),
    cells: usize,
    selected: bool,
}

fn territory_rows(editor: &TerritoryEditor) -> Vec<TerritoryRow> {
    let selected = editor.session().selected();
    editor
        .store()
        .iter()
        .map(|t| TerritoryRow {
            id: t.id.clone(),
            name: t.name.clone(),
            gang: t.gang.clone(),
            color: resolve_color(&t.color, &t.gang),
            cells: t.cells.len(),
            selected: selected == Some(t.id.as_str()),
        })
        .collect()
}

fn removal_policy_value(policy: RemovalPolicy) -> &'static str {
    match policy {
        RemovalPolicy::ExactCell => "exact",
        RemovalPolicy::Containment => "containment",
    }
}

fn parse_removal_policy(value: &str) -> RemovalPolicy {
    match value {
        "containment" => RemovalPolicy::Containment,
        _ => RemovalPolicy::ExactCell,
    }
}

/// Side panel: tools, staging values, territory list and filters.
#[component]
pub fn PaintControls() -> impl IntoView {
    let Editor(editor) = expect_context();
    let Toasts(toasts) = expect_context();

    let active = Memo::new(move |_| editor.with(|ed| ed.session().is_active()));

    view! {
        <div style=PANEL_STYLE>
            <h3 style="margin: 0 0 8px; padding-bottom: 8px; border-bottom: 1px solid #282c3e; text-align: center; font-size: 0.95rem;">
                "Paint Controls"
            </h3>
            {move || {
                if active.get() {
                    view! { <ActiveTools /> }.into_any()
                } else {
                    view! {
                        <button
                            style=button_style("#2f7d46")
                            on:click=move |_| run(editor, toasts, |ed| ed.start_painting(PaintMode::Add))
                        >
                            "Enter Edit Mode"
                        </button>
                    }
                    .into_any()
                }
            }}
            <ViewOptions />
            <TerritoryList />
            <button
                style=button_style("#6b3fa0")
                on:click=move |_| copy_static_data(editor, toasts)
            >
                "Copy static data"
            </button>
        </div>
    }
}

#[component]
fn ActiveTools() -> impl IntoView {
    let Editor(editor) = expect_context();
    let Toasts(toasts) = expect_context();
    let Loading(loading) = expect_context();

    let mode = Memo::new(move |_| editor.with(|ed| ed.session().mode()));
    let has_selection = Memo::new(move |_| editor.with(|ed| ed.session().selected().is_some()));
    let selected_summary = Memo::new(move |_| {
        editor.with(|ed| {
            ed.selected_territory()
                .map(|t| (t.id.clone(), t.name.clone()))
        })
    });

    let pick_tool = move |tool: PaintMode| {
        if tool == PaintMode::Edit && !has_selection.get_untracked() {
            show_toast(
                toasts,
                ToastKind::Error,
                "Please select a territory first by clicking its \"Select\" button",
            );
            return;
        }
        run(editor, toasts, |ed| ed.set_type_value(tool));
    };

    view! {
        <h4 style="margin: 4px 0 8px; text-align: center; font-size: 0.85rem;">
            {move || mode.get().label()}
        </h4>
        {move || {
            selected_summary.get().map(|(id, name)| view! {
                <div style="background: #1a1d2a; border-radius: 4px; padding: 6px; margin-bottom: 6px;">
                    <div><strong>"Editing: "</strong>{name}</div>
                    <div style="color: #9a9590; font-size: 0.7rem;">"ID: " {id}</div>
                </div>
            })
        }}
        {move || {
            if mode.get() == PaintMode::Edit {
                view! { <EditFields /> }.into_any()
            } else {
                view! { <StagingFields /> }.into_any()
            }
        }}
        <div style="display: grid; grid-template-columns: repeat(3, 1fr); gap: 6px; margin-top: 8px;">
            <button
                style=move || tool_style(mode.get() == PaintMode::Add, "#2f7d46")
                on:click=move |_| pick_tool(PaintMode::Add)
            >
                "Add"
            </button>
            <button
                style=move || tool_style(mode.get() == PaintMode::Remove, "#a23b3b")
                on:click=move |_| pick_tool(PaintMode::Remove)
            >
                "Remove"
            </button>
            <button
                style=move || tool_style(mode.get() == PaintMode::Edit, "#2d4f8f")
                disabled=move || !has_selection.get()
                on:click=move |_| pick_tool(PaintMode::Edit)
            >
                "Edit"
            </button>
        </div>
        {move || {
            (!has_selection.get() && mode.get() != PaintMode::Edit).then(|| view! {
                <button
                    style=button_style("#2d4f8f")
                    on:click=move |_| {
                        editor.update(|ed| {
                            ed.create_new_territory();
                        });
                    }
                >
                    "Create New Territory"
                </button>
            })
        }}
        <button
            style=button_style("#a23b3b")
            on:click=move |_| editor.update(|ed| ed.stop_painting())
        >
            "Exit Edit Mode"
        </button>
        <button
            style=button_style("#6b3fa0")
            disabled=move || loading.get() || !has_selection.get()
            on:click=move |_| save_selected(editor, toasts)
        >
            "Update"
        </button>
    }
}

/// Color, gang name and pixel size for new paint.
#[component]
fn StagingFields() -> impl IntoView {
    let Editor(editor) = expect_context();

    let color = Memo::new(move |_| editor.with(|ed| ed.session().color().to_string()));
    let gang_name = Memo::new(move |_| editor.with(|ed| ed.session().gang_name().to_string()));
    let box_size = Memo::new(move |_| editor.with(|ed| ed.session().box_size().get()));
    let removal = Memo::new(move |_| editor.with(|ed| ed.session().removal_policy()));
    let mode = Memo::new(move |_| editor.with(|ed| ed.session().mode()));

    view! {
        <div style="display: flex; align-items: center; gap: 8px;">
            <input
                type="color"
                prop:value=move || color.get()
                on:input=move |ev| {
                    let value = event_target_value(&ev);
                    editor.update(|ed| ed.set_color(&value));
                }
            />
            <span>{move || if mode.get() == PaintMode::Add { "Paint Color" } else { "Remove Color" }}</span>
        </div>
        <label style=LABEL_STYLE>"Gang Name:"</label>
        <input
            type="text"
            style=INPUT_STYLE
            prop:value=move || gang_name.get()
            on:input=move |ev| {
                let value = event_target_value(&ev);
                editor.update(|ed| ed.set_gang_name(&value));
            }
        />
        <label style=LABEL_STYLE>"Pixel Size:"</label>
        <select
            style=INPUT_STYLE
            prop:value=move || box_size.get().to_string()
            on:change=move |ev| {
                let Some(size) = event_target_value(&ev).parse().ok().and_then(BoxSize::new) else {
                    return;
                };
                editor.update(|ed| ed.set_box_size(size));
            }
        >
            {BOX_SIZE_CHOICES
                .iter()
                .map(|size| view! { <option value=size.to_string()>{format!("{size}px")}</option> })
                .collect_view()}
        </select>
        <label style=LABEL_STYLE>"Remove Pixels By:"</label>
        <select
            style=INPUT_STYLE
            prop:value=move || removal_policy_value(removal.get())
            on:change=move |ev| {
                let policy = parse_removal_policy(&event_target_value(&ev));
                editor.update(|ed| ed.set_removal_policy(policy));
            }
        >
            <option value="exact">"Exact cell"</option>
            <option value="containment">"Any cell under cursor"</option>
        </select>
    }
}

/// Property editors for the selected territory; only shown in edit mode.
#[component]
fn EditFields() -> impl IntoView {
    let Editor(editor) = expect_context();
    let Toasts(toasts) = expect_context();

    let fields = Memo::new(move |_| {
        editor.with(|ed| {
            ed.selected_territory().map(|t| {
                (
                    t.id.clone(),
                    t.name.clone(),
                    t.gang.clone(),
                    t.color.clone(),
                )
            })
        })
    });
    let field_value = move |pick: fn(&(String, String, String, String)) -> String| {
        move || fields.get().as_ref().map(pick).unwrap_or_default()
    };
    let set_field = move |field: TerritoryField, value: String| {
        run(editor, toasts, |ed| ed.set_field_value(field, &value));
    };

    view! {
        <label style=LABEL_STYLE>"ID:"</label>
        <input
            type="text"
            style=INPUT_STYLE
            prop:value=field_value(|f| f.0.clone())
            on:change=move |ev| set_field(TerritoryField::Id, event_target_value(&ev))
        />
        <label style=LABEL_STYLE>"Name:"</label>
        <input
            type="text"
            style=INPUT_STYLE
            prop:value=field_value(|f| f.1.clone())
            on:change=move |ev| set_field(TerritoryField::Name, event_target_value(&ev))
        />
        <label style=LABEL_STYLE>"Gang:"</label>
        <input
            type="text"
            style=INPUT_STYLE
            prop:value=field_value(|f| f.2.clone())
            on:change=move |ev| set_field(TerritoryField::Gang, event_target_value(&ev))
        />
        <div style="display: flex; align-items: center; gap: 8px; margin-top: 6px;">
            <label style="color: #9a9590; font-size: 0.72rem;">"Color:"</label>
            <input
                type="color"
                prop:value=field_value(|f| f.3.clone())
                on:input=move |ev| set_field(TerritoryField::Color, event_target_value(&ev))
            />
        </div>
    }
}

/// Visibility switch and gang filter.
#[component]
fn ViewOptions() -> impl IntoView {
    let Editor(editor) = expect_context();

    let show = Memo::new(move |_| editor.with(|ed| ed.show_territories()));
    let gangs = Memo::new(move |_| editor.with(|ed| ed.gang_names()));
    let filter_value = Memo::new(move |_| {
        editor.with(|ed| match ed.gang_filter() {
            GangFilter::All => "all".to_string(),
            GangFilter::Gang(gang) => gang.clone(),
        })
    });

    view! {
        <div style="margin-top: 12px; padding-top: 8px; border-top: 1px solid #282c3e;">
            <label style="display: flex; align-items: center; gap: 6px; cursor: pointer;">
                <input
                    type="checkbox"
                    prop:checked=move || show.get()
                    on:change=move |ev| {
                        let checked = event_target_checked(&ev);
                        editor.update(|ed| ed.set_show_territories(checked));
                    }
                />
                "Show territories"
            </label>
            <label style=LABEL_STYLE>"Gang filter:"</label>
            <select
                style=INPUT_STYLE
                prop:value=move || filter_value.get()
                on:change=move |ev| {
                    let filter = GangFilter::from_select_value(&event_target_value(&ev));
                    editor.update(|ed| ed.set_gang_filter(filter));
                }
            >
                <option value="all">"All Gangs"</option>
                {move || {
                    gangs
                        .get()
                        .into_iter()
                        .map(|gang| view! { <option value=gang.clone()>{gang.clone()}</option> })
                        .collect_view()
                }}
            </select>
        </div>
    }
}

#[component]
fn TerritoryList() -> impl IntoView {
    let Editor(editor) = expect_context();
    let Toasts(toasts) = expect_context();

    let rows = Memo::new(move |_| editor.with(territory_rows));

    view! {
        <div style="margin-top: 12px; padding-top: 8px; border-top: 1px solid #282c3e;">
            <div style="color: #9a9590; font-size: 0.72rem; margin-bottom: 4px;">
                {move || format!("Territories ({})", rows.with(Vec::len))}
            </div>
            {move || {
                rows.get()
                    .into_iter()
                    .map(|row| {
                        let select_id = row.id.clone();
                        let delete_id = row.id.clone();
                        let swatch = format!(
                            "width: 10px; height: 10px; border-radius: 2px; flex-shrink: 0; background: {};",
                            rgba_css(row.color, 1.0)
                        );
                        let row_style = if row.selected {
                            "display: flex; align-items: center; gap: 6px; padding: 4px; border-radius: 4px; background: rgba(245,197,66,0.12);"
                        } else {
                            "display: flex; align-items: center; gap: 6px; padding: 4px; border-radius: 4px;"
                        };
                        view! {
                            <div style=row_style>
                                <span style=swatch />
                                <span style="flex: 1; overflow: hidden; text-overflow: ellipsis; white-space: nowrap;" title=row.gang.clone()>
                                    {row.name.clone()}
                                    <span style="color: #5a5860; font-size: 0.68rem;">{format!(" {}px²", row.cells)}</span>
                                </span>
                                <button
                                    style=tool_style(row.selected, "#8a6d1f")
                                    on:click=move |_| {
                                        run(editor, toasts, |ed| ed.select_territory(&select_id).map(|_| ()));
                                    }
                                >
                                    {if row.selected { "Deselect" } else { "Select" }}
                                </button>
                                <button
                                    style=tool_style(false, "#a23b3b")
                                    title="Delete territory"
                                    on:click=move |_| run(editor, toasts, |ed| ed.delete_territory(&delete_id))
                                >
                                    "\u{2715}"
                                </button>
                            </div>
                        }
                    })
                    .collect_view()
            }}
        </div>
    }
}
