use std::cell::{Cell, RefCell};
use std::rc::Rc;

use leptos::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen::closure::Closure;
use web_sys::{
    CanvasRenderingContext2d, HtmlCanvasElement, HtmlImageElement, MouseEvent, PointerEvent,
    WheelEvent,
};

use turfmap_shared::{EditorOutcome, MapEvent, MapSurface, Point, RectStyle, TerritoryEditor};

use crate::app::{Editor, EditorRevision, Toast, ToastKind, Toasts, show_toast};
use crate::render_loop::FrameScheduler;
use crate::viewport::{MAP_HEIGHT, MAP_WIDTH, Viewport};

const BASE_MAP_URL: &str = "/map/base.png";
const BACKGROUND: &str = "#0c0e17";
/// Pointer travel (px) below which a press counts as a click rather than a drag.
const CLICK_SLOP_PX: f64 = 5.0;

/// Canvas 2D implementation of the map surface.
pub struct CanvasSurface<'a> {
    ctx: &'a CanvasRenderingContext2d,
    viewport: &'a Viewport,
    width: f64,
    height: f64,
    base_map: Option<&'a HtmlImageElement>,
}

impl MapSurface for CanvasSurface<'_> {
    fn project(&self, point: Point) -> (f64, f64) {
        self.viewport.map_to_screen(point)
    }

    fn unproject(&self, x: f64, y: f64) -> Point {
        self.viewport.screen_to_map(x, y)
    }

    fn clear(&mut self) {
        self.ctx.set_fill_style_str(BACKGROUND);
        self.ctx.fill_rect(0.0, 0.0, self.width, self.height);
        if let Some(image) = self.base_map {
            let (x0, y0) = self.project(Point::new(MAP_HEIGHT, 0.0));
            let (x1, y1) = self.project(Point::new(0.0, MAP_WIDTH));
            self.ctx
                .draw_image_with_html_image_element_and_dw_and_dh(
                    image,
                    x0,
                    y0,
                    x1 - x0,
                    y1 - y0,
                )
                .ok();
        }
    }

    fn draw_rectangle(
        &mut self,
        top_left: (f64, f64),
        bottom_right: (f64, f64),
        style: &RectStyle,
    ) {
        let (x, y) = top_left;
        let w = bottom_right.0 - x;
        let h = bottom_right.1 - y;
        if x > self.width || y > self.height || x + w < 0.0 || y + h < 0.0 {
            return;
        }
        self.ctx.set_fill_style_str(&style.fill_css());
        self.ctx.fill_rect(x, y, w, h);
        self.ctx.set_stroke_style_str(&style.stroke_css());
        self.ctx.set_line_width(style.stroke_weight);
        self.ctx.stroke_rect(x, y, w, h);
    }
}

struct ResizeBinding {
    window: web_sys::Window,
    handler: Closure<dyn Fn()>,
}

thread_local! {
    static RESIZE_BINDING: RefCell<Option<ResizeBinding>> = const { RefCell::new(None) };
}

fn bind_resize(on_resize: impl Fn() + 'static) {
    let Some(window) = web_sys::window() else {
        return;
    };
    unbind_resize();
    let handler = Closure::<dyn Fn()>::new(on_resize);
    if window
        .add_event_listener_with_callback("resize", handler.as_ref().unchecked_ref())
        .is_ok()
    {
        RESIZE_BINDING.with(|slot| {
            *slot.borrow_mut() = Some(ResizeBinding { window, handler });
        });
    }
}

fn unbind_resize() {
    RESIZE_BINDING.with(|slot| {
        if let Some(old) = slot.borrow_mut().take() {
            let _ = old.window.remove_event_listener_with_callback(
                "resize",
                old.handler.as_ref().unchecked_ref(),
            );
        }
    });
}

fn device_pixel_ratio() -> f64 {
    web_sys::window()
        .map(|w| w.device_pixel_ratio())
        .unwrap_or(1.0)
        .max(1.0)
}

fn load_base_map(slot: Rc<RefCell<Option<HtmlImageElement>>>, loaded: RwSignal<bool>) {
    let Ok(img) = HtmlImageElement::new() else {
        return;
    };
    let img_for_load = img.clone();
    let onload = Closure::once_into_js(move || {
        *slot.borrow_mut() = Some(img_for_load);
        loaded.set(true);
    });
    let onerror = Closure::once_into_js(move || {
        web_sys::console::warn_1(&format!("failed to load base map {BASE_MAP_URL}").into());
    });
    img.set_onload(Some(onload.unchecked_ref()));
    img.set_onerror(Some(onerror.unchecked_ref()));
    img.set_src(BASE_MAP_URL);
}

/// Apply a pointer event to the editor and surface any refusal as a toast.
fn dispatch(
    editor: RwSignal<TerritoryEditor>,
    toasts: RwSignal<Option<Toast>>,
    event: MapEvent,
) {
    let Some(result) = editor.try_update(|ed| ed.handle(event)) else {
        return;
    };
    match result {
        Ok(EditorOutcome::Deleted(id)) => {
            show_toast(toasts, ToastKind::Info, format!("Deleted {id}; save to sync"));
        }
        Ok(_) => {}
        Err(e) => show_toast(toasts, ToastKind::Error, e.to_string()),
    }
}

fn local_coords(canvas_ref: NodeRef<leptos::html::Canvas>, e: &MouseEvent) -> (f64, f64) {
    canvas_ref
        .get_untracked()
        .map(|el| {
            let rect = el.get_bounding_client_rect();
            (
                e.client_x() as f64 - rect.left(),
                e.client_y() as f64 - rect.top(),
            )
        })
        .unwrap_or((e.offset_x() as f64, e.offset_y() as f64))
}

/// Base map plus territory rectangles, with pan, zoom and paint input.
#[component]
pub fn MapCanvas() -> impl IntoView {
    let Editor(editor) = expect_context();
    let EditorRevision(revision) = expect_context();
    let Toasts(toasts) = expect_context();
    let viewport: RwSignal<Viewport> = expect_context();

    let canvas_ref = NodeRef::<leptos::html::Canvas>::new();
    let base_map: Rc<RefCell<Option<HtmlImageElement>>> = Rc::new(RefCell::new(None));
    let base_map_loaded = RwSignal::new(false);
    load_base_map(base_map.clone(), base_map_loaded);

    let is_dragging = Rc::new(Cell::new(false));
    let drag_start = Rc::new(Cell::new((0.0f64, 0.0f64)));
    let last_pos = Rc::new(Cell::new((0.0f64, 0.0f64)));

    let fitted = Rc::new(Cell::new(false));
    let cached_ctx: Rc<RefCell<Option<CanvasRenderingContext2d>>> = Rc::new(RefCell::new(None));

    let scheduler = FrameScheduler::new({
        let base_map = base_map.clone();
        move || {
            let Some(canvas) = canvas_ref.get_untracked() else {
                return;
            };
            let canvas: &HtmlCanvasElement = &canvas;
            let Some(parent) = canvas.parent_element() else {
                return;
            };
            let w = parent.client_width() as f64;
            let h = parent.client_height() as f64;
            if w <= 0.0 || h <= 0.0 {
                return;
            }

            if !fitted.get() {
                fitted.set(true);
                // The viewport change schedules the real paint.
                viewport.update(|vp| vp.fit_map(w, h));
                return;
            }

            let dpr = device_pixel_ratio();
            let pw = (w * dpr).round() as u32;
            let ph = (h * dpr).round() as u32;
            if canvas.width() != pw || canvas.height() != ph {
                canvas.set_width(pw);
                canvas.set_height(ph);
                // Resizing resets 2D context state.
                *cached_ctx.borrow_mut() = None;
            }

            let ctx = {
                let mut slot = cached_ctx.borrow_mut();
                if slot.is_none() {
                    let Some(ctx) = canvas
                        .get_context("2d")
                        .ok()
                        .flatten()
                        .and_then(|ctx| ctx.dyn_into::<CanvasRenderingContext2d>().ok())
                    else {
                        return;
                    };
                    ctx.set_transform(dpr, 0.0, 0.0, dpr, 0.0, 0.0).ok();
                    ctx.set_image_smoothing_enabled(false);
                    *slot = Some(ctx);
                }
                let Some(ctx) = slot.clone() else {
                    return;
                };
                ctx
            };

            let vp = viewport.get_untracked();
            let image = base_map.borrow().clone();
            let mut surface = CanvasSurface {
                ctx: &ctx,
                viewport: &vp,
                width: w,
                height: h,
                base_map: image.as_ref(),
            };
            editor.with_untracked(|ed| ed.draw(&mut surface));
        }
    });

    Effect::new({
        let scheduler = scheduler.clone();
        move || {
            revision.track();
            viewport.track();
            base_map_loaded.track();
            scheduler.request();
        }
    });

    Effect::new({
        let scheduler = scheduler.clone();
        move || {
            let scheduler = scheduler.clone();
            bind_resize(move || scheduler.request());
            on_cleanup(unbind_resize);
        }
    });

    let on_wheel = move |e: WheelEvent| {
        e.prevent_default();
        let delta = e.delta_y();
        let (x, y) = (e.offset_x() as f64, e.offset_y() as f64);
        viewport.update(|vp| vp.zoom_at(delta, x, y));
    };

    let on_pointer_down = {
        let is_dragging = is_dragging.clone();
        let drag_start = drag_start.clone();
        let last_pos = last_pos.clone();
        move |e: PointerEvent| {
            if e.button() != 0 {
                return;
            }
            is_dragging.set(true);
            let pos = (e.client_x() as f64, e.client_y() as f64);
            drag_start.set(pos);
            last_pos.set(pos);
            if let Some(target) = e.target()
                && let Ok(el) = target.dyn_into::<web_sys::HtmlElement>()
            {
                el.set_pointer_capture(e.pointer_id()).ok();
            }
        }
    };

    let on_pointer_move = {
        let is_dragging = is_dragging.clone();
        let last_pos = last_pos.clone();
        move |e: PointerEvent| {
            if !is_dragging.get() {
                return;
            }
            let (lx, ly) = last_pos.get();
            let (x, y) = (e.client_x() as f64, e.client_y() as f64);
            last_pos.set((x, y));
            viewport.update(|vp| vp.pan(x - lx, y - ly));
        }
    };

    let on_pointer_up = {
        let is_dragging = is_dragging.clone();
        move |_: PointerEvent| is_dragging.set(false)
    };

    let on_click = {
        let drag_start = drag_start.clone();
        move |e: MouseEvent| {
            let (sx, sy) = drag_start.get();
            let dx = (e.client_x() as f64 - sx).abs();
            let dy = (e.client_y() as f64 - sy).abs();
            if dx >= CLICK_SLOP_PX || dy >= CLICK_SLOP_PX {
                return;
            }
            let (x, y) = local_coords(canvas_ref, &e);
            let point = viewport.with_untracked(|vp| vp.screen_to_map(x, y));
            dispatch(
                editor,
                toasts,
                MapEvent::Click {
                    point,
                    shift: e.shift_key(),
                },
            );
        }
    };

    let on_context_menu = move |e: MouseEvent| {
        e.prevent_default();
        let (x, y) = local_coords(canvas_ref, &e);
        let point = viewport.with_untracked(|vp| vp.screen_to_map(x, y));
        dispatch(editor, toasts, MapEvent::ContextMenu { point });
    };

    let cursor = move || {
        if editor.with(|ed| ed.session().is_active()) {
            "crosshair"
        } else {
            "grab"
        }
    };

    view! {
        <div
            style="position: absolute; inset: 0; overflow: hidden;"
            on:wheel=on_wheel
            on:pointerdown=on_pointer_down
            on:pointermove=on_pointer_move
            on:pointerup=on_pointer_up
            on:click=on_click
            on:contextmenu=on_context_menu
        >
            <canvas
                node_ref=canvas_ref
                style="position: absolute; inset: 0; width: 100%; height: 100%; touch-action: none; image-rendering: pixelated;"
                style:cursor=cursor
            />
        </div>
    }
}
