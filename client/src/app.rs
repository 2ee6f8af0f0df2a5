use std::cell::{Cell, RefCell};

use gloo_storage::Storage;
use leptos::prelude::*;
use serde::{Deserialize, Serialize};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, spawn_local};

use turfmap_shared::colors::{is_hex_color, resolve_color, rgba_css};
use turfmap_shared::grid::DEFAULT_BOX_SIZE;
use turfmap_shared::session::{DEFAULT_GANG_NAME, DEFAULT_PAINT_COLOR, SessionState};
use turfmap_shared::{
    BOX_SIZE_CHOICES, BoxSize, PaintMode, SyncAction, TerritoryEditor, UpsertOutcome,
};

use crate::canvas::MapCanvas;
use crate::controls::PaintControls;
use crate::remote::sync_adapter;
use crate::viewport::Viewport;

const SETTINGS_KEY: &str = "turfmap_settings";
const TOAST_MS: u32 = 3_000;

/// Returns the current window inner dimensions, falling back to 1920x1080.
pub fn canvas_dimensions() -> (f64, f64) {
    let Some(window) = web_sys::window() else {
        return (1920.0, 1080.0);
    };
    let w = window
        .inner_width()
        .ok()
        .and_then(|v| v.as_f64())
        .unwrap_or(1920.0);
    let h = window
        .inner_height()
        .ok()
        .and_then(|v| v.as_f64())
        .unwrap_or(1080.0);
    (w, h)
}

/// Application state: territory store, paint session, popup and filters.
#[derive(Clone, Copy)]
pub(crate) struct Editor(pub RwSignal<TerritoryEditor>);

/// Editor revision; redraws and panel refreshes key off it.
#[derive(Clone, Copy)]
pub(crate) struct EditorRevision(pub Memo<u64>);

#[derive(Clone, Copy)]
pub(crate) struct Toasts(pub RwSignal<Option<Toast>>);

/// True until the first remote load settles.
#[derive(Clone, Copy)]
pub(crate) struct Loading(pub RwSignal<bool>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ToastKind {
    Info,
    Success,
    Error,
}

impl ToastKind {
    fn accent(self) -> &'static str {
        match self {
            Self::Info => "#5a8dee",
            Self::Success => "#3fb950",
            Self::Error => "#f85149",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Toast {
    id: u64,
    pub kind: ToastKind,
    pub message: String,
}

thread_local! {
    static NEXT_TOAST_ID: Cell<u64> = const { Cell::new(0) };
    static KEYDOWN_BINDING: RefCell<Option<KeydownBinding>> = const { RefCell::new(None) };
}

struct KeydownBinding {
    window: web_sys::Window,
    _handler: Closure<dyn Fn(web_sys::KeyboardEvent)>,
}

/// Show a transient notification, replacing the current one.
pub(crate) fn show_toast(
    toasts: RwSignal<Option<Toast>>,
    kind: ToastKind,
    message: impl Into<String>,
) {
    let id = NEXT_TOAST_ID.with(|next| {
        let id = next.get().wrapping_add(1);
        next.set(id);
        id
    });
    toasts.set(Some(Toast {
        id,
        kind,
        message: message.into(),
    }));
    spawn_local(async move {
        gloo_timers::future::TimeoutFuture::new(TOAST_MS).await;
        toasts.try_update(|current| {
            if current.as_ref().is_some_and(|t| t.id == id) {
                *current = None;
            }
        });
    });
}

/// Staging values remembered across reloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct Settings {
    paint_color: String,
    gang_name: String,
    box_size: u32,
    show_territories: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            paint_color: DEFAULT_PAINT_COLOR.to_string(),
            gang_name: DEFAULT_GANG_NAME.to_string(),
            box_size: DEFAULT_BOX_SIZE,
            show_territories: true,
        }
    }
}

impl Settings {
    fn from_editor(editor: &TerritoryEditor) -> Self {
        let session = editor.session();
        Self {
            paint_color: session.color().to_string(),
            gang_name: session.gang_name().to_string(),
            box_size: session.box_size().get(),
            show_territories: editor.show_territories(),
        }
    }

    /// Stale or hand-edited values fall back to defaults.
    fn apply_to(&self, editor: &mut TerritoryEditor) {
        if is_hex_color(&self.paint_color) {
            editor.set_color(&self.paint_color);
        }
        if !self.gang_name.trim().is_empty() {
            editor.set_gang_name(&self.gang_name);
        }
        if BOX_SIZE_CHOICES.contains(&self.box_size)
            && let Some(size) = BoxSize::new(self.box_size)
        {
            editor.set_box_size(size);
        }
        editor.set_show_territories(self.show_territories);
    }
}

fn log_info(message: &str) {
    web_sys::console::info_1(&message.into());
}

fn log_warn(message: &str) {
    web_sys::console::warn_1(&message.into());
}

async fn load_territories(editor: RwSignal<TerritoryEditor>, toasts: RwSignal<Option<Toast>>) {
    let adapter = sync_adapter();
    match adapter.load_all().await {
        Ok(territories) => {
            let count = territories.len();
            editor.try_update(|ed| ed.apply_loaded(territories));
            log_info(&format!("loaded {count} territories"));
        }
        Err(e) => {
            log_warn(&format!("territory load failed: {e}"));
            show_toast(toasts, ToastKind::Error, e.user_message(SyncAction::Load));
        }
    }
}

/// Persist the selected territory, then push deletions made since the last
/// save.
///
/// The request is not cancelled when the app unmounts; it completes in the
/// background and its result is dropped along with the disposed signals.
pub(crate) fn save_selected(editor: RwSignal<TerritoryEditor>, toasts: RwSignal<Option<Toast>>) {
    let snapshot = match editor.with_untracked(|ed| ed.save_snapshot()) {
        Ok(territory) => territory,
        Err(e) => {
            show_toast(toasts, ToastKind::Error, e.to_string());
            return;
        }
    };
    let adapter = sync_adapter();
    let action = if snapshot.persisted {
        SyncAction::Update
    } else {
        SyncAction::Save
    };

    spawn_local(async move {
        match adapter.upsert(&snapshot).await {
            Ok(outcome) => {
                editor.try_update(|ed| ed.mark_saved(&snapshot.id));
                let message = match outcome {
                    UpsertOutcome::Inserted => format!("Saved {}", snapshot.name),
                    UpsertOutcome::Updated => format!("Updated {}", snapshot.name),
                };
                show_toast(toasts, ToastKind::Success, message);
            }
            Err(e) => {
                log_warn(&format!("save of {} failed: {e}", snapshot.id));
                show_toast(toasts, ToastKind::Error, e.user_message(action));
            }
        }
        flush_deletes(editor, toasts).await;
    });
}

async fn flush_deletes(editor: RwSignal<TerritoryEditor>, toasts: RwSignal<Option<Toast>>) {
    let Some(pending) = editor.try_with_untracked(|ed| ed.pending_deletes()) else {
        return;
    };
    let adapter = sync_adapter();
    for id in pending {
        match adapter.delete(&id).await {
            Ok(()) => {
                editor.try_update(|ed| ed.mark_deleted_remotely(&id));
            }
            Err(e) => {
                log_warn(&format!("delete of {id} failed: {e}"));
                show_toast(toasts, ToastKind::Error, e.user_message(SyncAction::Delete));
                return;
            }
        }
    }
}

/// Copy every territory as static JSON records.
pub(crate) fn copy_static_data(editor: RwSignal<TerritoryEditor>, toasts: RwSignal<Option<Toast>>) {
    let json = match editor.with_untracked(|ed| ed.export_static_data()) {
        Ok(json) => json,
        Err(e) => {
            log_warn(&format!("static data export failed: {e}"));
            show_toast(toasts, ToastKind::Error, "Failed to copy data");
            return;
        }
    };
    let Some(window) = web_sys::window() else {
        return;
    };
    let promise = window.navigator().clipboard().write_text(&json);
    spawn_local(async move {
        match JsFuture::from(promise).await {
            Ok(_) => show_toast(
                toasts,
                ToastKind::Success,
                "Static data copied to clipboard",
            ),
            Err(_) => show_toast(toasts, ToastKind::Error, "Failed to copy data"),
        }
    });
}

/// Root application component. Provides global reactive signals via context.
#[component]
pub fn App() -> impl IntoView {
    let saved: Settings = gloo_storage::LocalStorage::get(SETTINGS_KEY).unwrap_or_default();
    let mut initial = TerritoryEditor::default();
    saved.apply_to(&mut initial);

    let editor: RwSignal<TerritoryEditor> = RwSignal::new(initial);
    let revision = Memo::new(move |_| editor.with(|ed| ed.revision()));
    let viewport: RwSignal<Viewport> = RwSignal::new(Viewport::default());
    let toasts: RwSignal<Option<Toast>> = RwSignal::new(None);
    let loading: RwSignal<bool> = RwSignal::new(true);

    provide_context(Editor(editor));
    provide_context(EditorRevision(revision));
    provide_context(Toasts(toasts));
    provide_context(Loading(loading));
    provide_context(viewport);

    // Persist staging settings to localStorage on change
    let settings = Memo::new(move |_| editor.with(Settings::from_editor));
    Effect::new(move || {
        let _ = gloo_storage::LocalStorage::set(SETTINGS_KEY, settings.get());
    });

    // Load the full territory set on mount
    Effect::new(move || {
        spawn_local(async move {
            load_territories(editor, toasts).await;
            loading.try_set(false);
        });
    });

    // Keyboard shortcuts
    Effect::new(move || {
        let Some(window) = web_sys::window() else {
            return;
        };

        KEYDOWN_BINDING.with(|slot| {
            if let Some(old) = slot.borrow_mut().take() {
                let _ = old.window.remove_event_listener_with_callback(
                    "keydown",
                    old._handler.as_ref().unchecked_ref(),
                );
            }
        });

        let handler =
            Closure::<dyn Fn(web_sys::KeyboardEvent)>::new(move |e: web_sys::KeyboardEvent| {
                let target_tag = e
                    .target()
                    .and_then(|t| t.dyn_into::<web_sys::HtmlElement>().ok())
                    .map(|el| el.tag_name())
                    .unwrap_or_default();
                if matches!(target_tag.as_str(), "INPUT" | "SELECT" | "TEXTAREA") {
                    return;
                }

                match e.key().as_str() {
                    "Escape" => editor.update(|ed| {
                        if ed.popup().is_some() {
                            ed.close_popup();
                        } else {
                            ed.stop_painting();
                        }
                    }),
                    "a" => editor.update(|ed| {
                        let _ = ed.set_type_value(PaintMode::Add);
                    }),
                    "r" => editor.update(|ed| {
                        let _ = ed.set_type_value(PaintMode::Remove);
                    }),
                    "0" => {
                        let (cw, ch) = canvas_dimensions();
                        viewport.update(|vp| vp.fit_map(cw, ch));
                    }
                    _ => {}
                }
            });

        if window
            .add_event_listener_with_callback("keydown", handler.as_ref().unchecked_ref())
            .is_ok()
        {
            KEYDOWN_BINDING.with(|slot| {
                *slot.borrow_mut() = Some(KeydownBinding {
                    window: window.clone(),
                    _handler: handler,
                });
            });
        }
    });

    view! {
        <div style="width: 100%; height: 100%; position: relative; overflow: hidden; background: #0c0e17;">
            <MapCanvas />
            <TerritoryPopup />
            <PaintControls />
            {move || {
                loading.get().then(|| view! {
                    <div style="position: absolute; top: 16px; left: 50%; transform: translateX(-50%); padding: 6px 12px; background: #13161f; border: 1px solid #282c3e; border-radius: 6px; color: #9a9590; font-size: 0.75rem; pointer-events: none;">
                        "Loading territories..."
                    </div>
                })
            }}
            <ToastHost />
        </div>
    }
}

/// Name and gang of the clicked territory, pinned to the clicked cell.
#[component]
fn TerritoryPopup() -> impl IntoView {
    let Editor(editor) = expect_context();
    let viewport: RwSignal<Viewport> = expect_context();

    let info = Memo::new(move |_| {
        editor.with(|ed| {
            if ed.session().state() == SessionState::Painting(PaintMode::Edit) {
                return None;
            }
            let anchor = ed.popup()?.anchor;
            let territory = ed.popup_territory()?;
            let color = resolve_color(&territory.color, &territory.gang);
            Some((
                anchor,
                territory.name.clone(),
                territory.gang.clone(),
                color,
            ))
        })
    });

    view! {
        {move || {
            let Some((anchor, name, gang, color)) = info.get() else {
                return ().into_any();
            };
            let (x, y) = viewport.with(|vp| vp.map_to_screen(anchor));
            view! {
                <div
                    style:left=format!("{x}px")
                    style:top=format!("{y}px")
                    style="position: absolute; transform: translate(-50%, calc(-100% - 10px)); z-index: 20; min-width: 160px; background: #161921; border: 1px solid #282c3e; border-radius: 6px; box-shadow: 0 4px 16px rgba(0,0,0,0.5); padding: 8px 10px; color: #e2e0d8; font-size: 0.8rem;"
                >
                    <h3 style={format!("margin: 0 0 4px; text-align: center; font-size: 1.1rem; color: {};", rgba_css(color, 1.0))}>
                        {name}
                    </h3>
                    <hr style="border: none; border-top: 1px solid #282c3e; margin: 4px 0;" />
                    <p style="margin: 4px 0;"><strong>"Gang: "</strong>{gang}</p>
                    <button
                        style="width: 100%; margin-top: 4px; padding: 3px; background: #2d4f8f; color: #fff; border: none; border-radius: 4px; cursor: pointer; font-size: 0.72rem;"
                        on:click=move |_| editor.update(|ed| ed.close_popup())
                    >
                        "Close"
                    </button>
                </div>
            }
            .into_any()
        }}
    }
}

#[component]
fn ToastHost() -> impl IntoView {
    let Toasts(toasts) = expect_context();

    view! {
        {move || {
            let Some(toast) = toasts.get() else {
                return ().into_any();
            };
            view! {
                <div
                    class="toast"
                    style={format!(
                        "position: absolute; bottom: 24px; left: 50%; transform: translateX(-50%); z-index: 50; padding: 8px 14px; background: #161921; border: 1px solid #282c3e; border-left: 3px solid {}; border-radius: 6px; color: #e2e0d8; font-size: 0.8rem; box-shadow: 0 4px 16px rgba(0,0,0,0.5);",
                        toast.kind.accent()
                    )}
                >
                    {toast.message}
                </div>
            }
            .into_any()
        }}
    }
}
