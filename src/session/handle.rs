use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::garment::{Product, Selection};

/// レンダーループと操作側で共有する状態。すべて同一スレッド上。
pub(crate) struct Control {
    token: RefCell<CancellationToken>,
    selection: watch::Sender<Selection>,
    debug_skeleton: Cell<bool>,
}

impl Control {
    pub(crate) fn new(debug_skeleton: bool) -> (Rc<Self>, watch::Receiver<Selection>) {
        let (selection, rx) = watch::channel(Selection::default());
        let token = CancellationToken::new();
        token.cancel();
        let control = Self {
            token: RefCell::new(token),
            selection,
            debug_skeleton: Cell::new(debug_skeleton),
        };
        (Rc::new(control), rx)
    }

    /// 新しい実行用のトークン。以前のトークンは取り消されたまま。
    pub(crate) fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.token.borrow_mut() = token.clone();
        token
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.token.borrow().clone()
    }

    pub(crate) fn cancel(&self) {
        self.token.borrow().cancel();
    }

    pub(crate) fn debug_skeleton(&self) -> bool {
        self.debug_skeleton.get()
    }
}

/// 実行中セッションの操作ハンドル（複製可）
///
/// 値が実際に変わった時だけループを起こすので、再合成は変更1回につき1回。
#[derive(Clone)]
pub struct SessionHandle {
    control: Rc<Control>,
}

impl SessionHandle {
    pub(crate) fn new(control: Rc<Control>) -> Self {
        Self { control }
    }

    /// ループを取り消す。次の反復より前に効き、実行中の推論結果は捨てる。
    pub fn stop(&self) {
        self.control.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.control.token().is_cancelled()
    }

    pub fn selection(&self) -> Selection {
        self.control.selection.borrow().clone()
    }

    /// 色が変わったら `true`
    pub fn select_color(&self, color: &str) -> bool {
        self.control.selection.send_if_modified(|sel| {
            if sel.color.as_deref() == Some(color) {
                return false;
            }
            sel.color = Some(color.to_string());
            true
        })
    }

    /// 商品を切り替える。色は `color` → 現在の色 → 商品の先頭色の順で、
    /// 新しい商品にあるものを使う。
    pub fn select_product(&self, product: Product, color: Option<&str>) -> bool {
        self.control.selection.send_if_modified(|sel| {
            let color = color
                .filter(|c| product.has_color(c))
                .or_else(|| sel.color.as_deref().filter(|c| product.has_color(c)))
                .or_else(|| product.colors.first().map(String::as_str))
                .map(str::to_string);
            let next = Selection {
                product: Some(product),
                color,
            };
            if *sel == next {
                return false;
            }
            *sel = next;
            true
        })
    }

    /// 次の色へ
    pub fn next_color(&self) -> Option<String> {
        let selection = self.selection();
        let product = selection.product.as_ref()?;
        let next = product.next_color(selection.color.as_deref())?.to_string();
        self.select_color(&next);
        Some(next)
    }

    pub fn set_debug_skeleton(&self, enabled: bool) {
        self.control.debug_skeleton.set(enabled);
    }

    pub fn toggle_debug_skeleton(&self) -> bool {
        let enabled = !self.control.debug_skeleton();
        self.set_debug_skeleton(enabled);
        enabled
    }
}
