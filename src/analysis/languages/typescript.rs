//! TypeScript language analyzer using tree-sitter.
//!
//! Shares call extraction with JavaScript, but resolves identifiers through
//! their declared types and follows imports inside the owning `TsProject`.

use std::path::Path;

use tree_sitter::Language;

use crate::analysis::syntax::CompiledQuery;
use crate::analysis::traits::parse_with;
use crate::analysis::{FileContext, LanguageAnalyzer, ParsedFile};
use crate::error::AnalyzeError;
use crate::event::TrackingEvent;

use super::ecmascript::{self, LocalTypes, ModuleResolver, CALL_QUERY};

fn is_tsx(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("tsx")
}

/// Grammar for a TypeScript path; `.tsx` needs the JSX-aware variant.
pub(crate) fn ts_language(path: &Path) -> Language {
    if is_tsx(path) {
        tree_sitter_typescript::LANGUAGE_TSX.into()
    } else {
        tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
    }
}

pub struct TypeScriptAnalyzer {
    typescript: CompiledQuery,
    tsx: CompiledQuery,
}

impl TypeScriptAnalyzer {
    pub fn new() -> Self {
        Self {
            typescript: CompiledQuery::new(
                tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
                CALL_QUERY,
            ),
            tsx: CompiledQuery::new(tree_sitter_typescript::LANGUAGE_TSX.into(), CALL_QUERY),
        }
    }

    fn calls_for(&self, path: &Path) -> &CompiledQuery {
        if is_tsx(path) {
            &self.tsx
        } else {
            &self.typescript
        }
    }
}

impl Default for TypeScriptAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAnalyzer for TypeScriptAnalyzer {
    fn language_id(&self) -> &'static str {
        "typescript"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["ts", "tsx", "mts", "cts"]
    }

    fn parse(&self, path: &Path, source: &[u8]) -> Result<ParsedFile, AnalyzeError> {
        parse_with(self.calls_for(path).language(), path, source)
    }

    fn find_events(&self, parsed: &ParsedFile, ctx: &FileContext<'_>) -> Vec<TrackingEvent> {
        let resolver: &dyn ModuleResolver = match ctx.ts_project {
            Some(project) => project,
            None => &LocalTypes,
        };
        ecmascript::find_events(self.calls_for(&parsed.path), parsed, ctx.signatures, resolver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::languages::TsProject;
    use crate::providers::Source;
    use crate::schema::PropertySchema;
    use std::fs;
    use tempfile::TempDir;

    fn events(source: &str) -> Vec<TrackingEvent> {
        let analyzer = TypeScriptAnalyzer::new();
        let parsed = analyzer
            .parse(Path::new("app.ts"), source.as_bytes())
            .unwrap();
        analyzer.find_events(&parsed, &FileContext::new(&[]))
    }

    #[test]
    fn test_interface_parameter_expands_properties() {
        let found = events(
            r#"
interface CheckoutProps {
  total: number;
  coupon?: string;
  items: Item[];
  meta: Record<string, string>;
}
interface Item { sku: string; qty: number }

function pay(props: CheckoutProps) {
  analytics.track('Paid', props);
}
"#,
        );
        assert_eq!(found.len(), 1);
        let props = &found[0].properties;
        assert_eq!(found[0].function_name, "pay");
        assert_eq!(props["total"], PropertySchema::number());
        assert_eq!(props["coupon"], PropertySchema::label("string | undefined"));
        assert_eq!(props["meta"], PropertySchema::object(Default::default()));
        match &props["items"] {
            PropertySchema::Array { items } => match items.as_ref() {
                PropertySchema::Object { fields } => {
                    assert_eq!(fields["sku"], PropertySchema::string());
                    assert_eq!(fields["qty"], PropertySchema::number());
                }
                other => panic!("expected object items, got {:?}", other),
            },
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_enum_names_and_typed_values() {
        let found = events(
            r#"
enum Events { Signup = 'Sign Up' }
const plan: 'pro' | 'free' = 'pro';
const count = 3;
analytics.track(Events.Signup, {
  plan,
  count,
  ok: count > 1,
  label: `x${count}`,
  id: user!.id as string,
  maybe: undefined,
});
"#,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].event_name, "Sign Up");
        assert_eq!(found[0].source, Source::Segment);
        let props = &found[0].properties;
        assert_eq!(props["plan"], PropertySchema::string());
        assert_eq!(props["count"], PropertySchema::number());
        assert_eq!(props["ok"], PropertySchema::boolean());
        assert_eq!(props["label"], PropertySchema::string());
        assert_eq!(props["id"], PropertySchema::string());
        assert_eq!(props["maybe"], PropertySchema::label("undefined"));
    }

    #[test]
    fn test_member_access_uses_declared_types() {
        let found = events(
            r#"
interface Product { id: string; price: number; tags: string[]; owner: { name: string } }

function add(product: Product, items: string[], note: string) {
  analytics.track('add_to_cart', {
    product_id: product.id,
    price: product.price,
    n: items.length,
    note_len: note.length,
    first_tag: product.tags[0],
    owner: product.owner.name,
    unknown: product.missing,
  });
}
"#,
        );
        assert_eq!(found.len(), 1);
        let props = &found[0].properties;
        assert_eq!(props["product_id"], PropertySchema::string());
        assert_eq!(props["price"], PropertySchema::number());
        assert_eq!(props["n"], PropertySchema::number());
        assert_eq!(props["note_len"], PropertySchema::number());
        assert_eq!(props["first_tag"], PropertySchema::string());
        assert_eq!(props["owner"], PropertySchema::string());
        assert!(props["unknown"].is_any());
    }

    #[test]
    fn test_this_members_from_fields_and_constructor() {
        let found = events(
            r#"
class Cart {
  total: number = 0;
  private label = 'cart';

  constructor(private readonly userId: string, public coupon?: string) {}

  checkout() {
    analytics.track('Cart Checkout', {
      total: this.total,
      label: this.label,
      user: this.userId,
      coupon: this.coupon,
    });
  }
}
"#,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].function_name, "checkout");
        let props = &found[0].properties;
        assert_eq!(props["total"], PropertySchema::number());
        assert_eq!(props["label"], PropertySchema::string());
        assert_eq!(props["user"], PropertySchema::string());
        assert_eq!(props["coupon"], PropertySchema::label("string | undefined"));
    }

    #[test]
    fn test_snowplow_payload_through_local() {
        let found = events(
            r#"
function viewItem(itemId: string) {
  const payload = buildStructEvent({ category: 'catalog', action: 'item_view', label: itemId });
  tracker.track(payload);
}
"#,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].event_name, "item_view");
        assert_eq!(found[0].source, Source::Snowplow);
        assert_eq!(found[0].line, 4);
        assert!(!found[0].properties.contains_key("action"));
        assert_eq!(found[0].properties["label"], PropertySchema::string());
    }

    #[test]
    fn test_nullable_object_union_and_cycles() {
        let found = events(
            r#"
type Node = { name: string; parent: Node | null };
function visit(n: Node) {
  posthog.capture('Visited', { node: n });
}
"#,
        );
        let node = &found[0].properties["node"];
        match node {
            PropertySchema::Object { fields } => {
                assert_eq!(fields["name"], PropertySchema::string());
                assert!(fields["parent"].is_any());
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_tsx_component_hook_context() {
        let analyzer = TypeScriptAnalyzer::new();
        let source = r#"
export const Dashboard = () => {
  useEffect(() => { mixpanel.track('Dashboard Viewed'); }, []);
  return <div />;
};
"#;
        let parsed = analyzer
            .parse(Path::new("Dashboard.tsx"), source.as_bytes())
            .unwrap();
        let found = analyzer.find_events(&parsed, &FileContext::new(&[]));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].function_name, "Dashboard.useEffect");
    }

    #[test]
    fn test_cross_file_constants_and_types() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::write(
            root.join("tsconfig.json"),
            r#"{ "compilerOptions": { "baseUrl": ".", "paths": { "@app/*": ["src/*"] } } }"#,
        )
        .unwrap();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(
            root.join("src/constants.ts"),
            "export const EVENTS = { SIGNUP: 'Signed Up' } as const;\n",
        )
        .unwrap();
        fs::write(root.join("src/index.ts"), "export * from './constants';\n").unwrap();
        fs::write(
            root.join("src/types.ts"),
            "export interface SignupProps { plan: string; seats?: number }\n",
        )
        .unwrap();
        let app = root.join("src/app.ts");
        fs::write(
            &app,
            r#"
import { EVENTS } from '@app/index';
import type { SignupProps } from './types';

export function signup(p: SignupProps) {
  analytics.track(EVENTS.SIGNUP, p);
}
"#,
        )
        .unwrap();

        let project = TsProject::load(&root.join("tsconfig.json"));
        let parsed = project.module(&app).unwrap();
        let mut ctx = FileContext::new(&[]);
        ctx.ts_project = Some(&project);

        let found = TypeScriptAnalyzer::new().find_events(&parsed, &ctx);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].event_name, "Signed Up");
        assert_eq!(found[0].properties["plan"], PropertySchema::string());
        assert_eq!(
            found[0].properties["seats"],
            PropertySchema::label("number | undefined")
        );
    }
}
