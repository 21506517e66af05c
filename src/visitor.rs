use crate::parse::{CommentNode, ElementNode, MarkupNode, RawBlockNode, TextNode};

/// The MarkupVisitor trait is the single traversal mechanism for the markup tree
/// of a stories file.
///
/// Rules:
/// 1. Traversal is in document order.
/// 2. Implementers override `visit_*` methods to add behavior.
/// 3. Implementers call the `walk_*` functions to continue traversal unless pruning is intended.
pub trait MarkupVisitor<'m> {
    fn visit_document(&mut self, nodes: &'m [MarkupNode]) {
        self.visit_children(nodes);
    }

    fn visit_children(&mut self, children: &'m [MarkupNode]) {
        walk_children(self, children);
    }

    fn visit_node(&mut self, node: &'m MarkupNode) {
        walk_node(self, node);
    }

    fn visit_element(&mut self, element: &'m ElementNode) {
        walk_element(self, element);
    }

    fn visit_comment(&mut self, _comment: &'m CommentNode) {}

    fn visit_text(&mut self, _text: &'m TextNode) {}

    fn visit_raw_block(&mut self, _block: &'m RawBlockNode) {}
}

pub fn walk_children<'m, V: MarkupVisitor<'m> + ?Sized>(visitor: &mut V, children: &'m [MarkupNode]) {
    for node in children {
        visitor.visit_node(node);
    }
}

pub fn walk_node<'m, V: MarkupVisitor<'m> + ?Sized>(visitor: &mut V, node: &'m MarkupNode) {
    match node {
        MarkupNode::Element(el) => visitor.visit_element(el),
        MarkupNode::Comment(c) => visitor.visit_comment(c),
        MarkupNode::Text(t) => visitor.visit_text(t),
        MarkupNode::RawBlock(b) => visitor.visit_raw_block(b),
    }
}

pub fn walk_element<'m, V: MarkupVisitor<'m> + ?Sized>(visitor: &mut V, element: &'m ElementNode) {
    visitor.visit_children(&element.children);
}
