//! Per-event-type handler registry.

use std::sync::Weak;

use circle_core::{FrameKind, ServerFrame, Signal, SlotId};

/// One signal per frame kind. Registration is additive.
#[derive(Debug, Default)]
pub(crate) struct HandlerRegistry {
    chat: Signal<ServerFrame>,
    dm: Signal<ServerFrame>,
    error: Signal<ServerFrame>,
}

impl HandlerRegistry {
    pub(crate) fn signal(&self, kind: FrameKind) -> &Signal<ServerFrame> {
        match kind {
            FrameKind::Chat => &self.chat,
            FrameKind::Dm => &self.dm,
            FrameKind::Error => &self.error,
        }
    }

    /// Invoke every handler registered for the frame's kind.
    pub(crate) fn dispatch(&self, frame: ServerFrame) -> usize {
        self.signal(frame.kind()).emit(frame)
    }

    pub(crate) fn clear(&self) {
        for kind in [FrameKind::Chat, FrameKind::Dm, FrameKind::Error] {
            self.signal(kind).disconnect_all();
        }
    }
}

/// A registered frame handler.
///
/// The handler stays registered while this value is alive. Dropping it, or
/// calling [`unsubscribe`](Self::unsubscribe), removes this handler only;
/// other handlers for the same kind keep receiving frames.
#[must_use = "dropping a Subscription removes its handler"]
pub struct Subscription {
    registry: Weak<HandlerRegistry>,
    kind: FrameKind,
    id: Option<SlotId>,
}

impl Subscription {
    pub(crate) fn new(registry: Weak<HandlerRegistry>, kind: FrameKind, id: SlotId) -> Self {
        Self {
            registry,
            kind,
            id: Some(id),
        }
    }

    /// The frame kind this handler receives.
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Remove the handler now.
    ///
    /// Returns `false` if the connection manager is already gone.
    pub fn unsubscribe(mut self) -> bool {
        self.remove()
    }

    /// Keep the handler registered for the lifetime of the connection manager.
    pub fn detach(mut self) {
        self.id = None;
    }

    fn remove(&mut self) -> bool {
        let Some(id) = self.id.take() else {
            return false;
        };
        match self.registry.upgrade() {
            Some(registry) => registry.signal(self.kind).disconnect(id),
            None => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("active", &self.id.is_some())
            .finish()
    }
}
